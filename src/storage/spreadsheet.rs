use std::path::Path;

use umya_spreadsheet::{reader, writer, Worksheet};

use crate::error::SinkFailure;
use crate::storage::{Row, COLUMNS};

/// Longest text Excel accepts in one cell.
pub const MAX_CELL_CHARS: usize = 32_767;

fn fit_cell(value: &str) -> String {
    match value.char_indices().nth(MAX_CELL_CHARS) {
        Some((end, _)) => value[..end].to_string(),
        None => value.to_string(),
    }
}

fn write_row(sheet: &mut Worksheet, row_index: u32, values: impl IntoIterator<Item = impl Into<String>>) {
    for (column, value) in (1u32..).zip(values) {
        sheet.get_cell_mut((column, row_index)).set_value(value);
    }
}

/// Appends `rows` below the last used row of the first worksheet.
///
/// The workbook is created when `path` does not exist yet, and an empty sheet
/// gets a header row first. Cells are cut to [`MAX_CELL_CHARS`].
pub fn append_rows(path: &Path, rows: &[Row]) -> Result<(), SinkFailure> {
    let mut book = if path.exists() {
        reader::xlsx::read(path)?
    } else {
        umya_spreadsheet::new_file()
    };

    let sheet = book.get_sheet_mut(&0).ok_or(SinkFailure::MissingSheet)?;
    if sheet.get_highest_row() == 0 {
        write_row(sheet, 1, COLUMNS);
    }

    let mut next_row = sheet.get_highest_row() + 1;
    for row in rows {
        write_row(sheet, next_row, row.iter().map(|value| fit_cell(value)));
        next_row += 1;
    }

    writer::xlsx::write(&book, path)?;
    Ok(())
}
