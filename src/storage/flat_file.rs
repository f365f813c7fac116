use std::fs::OpenOptions;
use std::path::Path;

use csv::WriterBuilder;

use crate::error::SinkFailure;
use crate::storage::{Row, COLUMNS};

/// Appends `rows` to the CSV file at `path`, writing the header first if the file is new or empty.
pub fn append_rows(path: &Path, rows: &[Row]) -> Result<(), SinkFailure> {
    let file = OpenOptions::new().create(true).append(true).open(path)?;
    let needs_header = file.metadata()?.len() == 0;

    let mut writer = WriterBuilder::new().has_headers(false).from_writer(file);
    if needs_header {
        writer.write_record(COLUMNS)?;
    }
    for row in rows {
        writer.write_record(row)?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::tests::record;
    use crate::storage::to_row;

    fn read_all(path: &Path) -> Vec<Vec<String>> {
        csv::ReaderBuilder::new()
            .has_headers(false)
            .from_path(path)
            .unwrap()
            .records()
            .map(|r| r.unwrap().iter().map(str::to_string).collect())
            .collect()
    }

    #[test]
    fn header_is_written_once_across_appends() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("emails.csv");

        append_rows(&path, &[to_row(&record(1, "first"))]).unwrap();
        append_rows(&path, &[to_row(&record(2, "second")), to_row(&record(3, "third"))]).unwrap();

        let rows = read_all(&path);
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[0], COLUMNS.to_vec());
        assert_eq!(rows[1][4], "first");
        assert_eq!(rows[3][4], "third");
    }

    #[test]
    fn multiline_body_survives_quoting() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("emails.csv");

        append_rows(&path, &[to_row(&record(1, "comma, quote \" and more"))]).unwrap();

        let rows = read_all(&path);
        assert_eq!(rows[1][4], "comma, quote \" and more");
        assert_eq!(rows[1][5], "Hello,\nsee attached.");
    }

    #[test]
    fn empty_existing_file_gets_header() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("emails.csv");
        std::fs::write(&path, b"").unwrap();

        append_rows(&path, &[]).unwrap();

        assert_eq!(read_all(&path), vec![COLUMNS.to_vec()]);
    }
}
