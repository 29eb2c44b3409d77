use std::fs::File;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use phi_rec::{IterationTable, ITERATION_COLUMN, NET_PHI_COLUMN};

/// Write `IterNo, <groups...>, NetPhi` to `path`, replacing any existing file.
pub fn write_table_csv(table: &IterationTable, path: &Path) -> Result<()> {
    let file =
        File::create(path).with_context(|| format!("failed to create {}", path.display()))?;
    let mut writer = csv::Writer::from_writer(file);
    write_table_rows(table, &mut writer)
        .with_context(|| format!("failed to write {}", path.display()))
}

pub fn write_table_rows<W: Write>(
    table: &IterationTable,
    writer: &mut csv::Writer<W>,
) -> Result<()> {
    let header = std::iter::once(ITERATION_COLUMN)
        .chain(table.groups().iter().map(String::as_str))
        .chain(std::iter::once(NET_PHI_COLUMN));
    writer.write_record(header)?;

    for row in table.rows() {
        let record = std::iter::once(row.iteration.to_string())
            .chain(row.values.iter().map(f64::to_string))
            .chain(std::iter::once(row.net_phi().to_string()));
        writer.write_record(record)?;
    }

    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use phi_rec::{reconstruct_report, Params};

    fn to_csv(table: &IterationTable) -> String {
        let mut writer = csv::Writer::from_writer(Vec::new());
        write_table_rows(table, &mut writer).unwrap();
        String::from_utf8(writer.into_inner().unwrap()).unwrap()
    }

    #[test]
    fn wells_and_rivers_table() {
        let text = "Contribution x \"wells\" = 10\nContribution x \"rivers\" = 5\n\
                    Contribution x \"wells\" = 3\nContribution x \"rivers\" = 2\n\
                    Contribution x \"wells\" = 1\nContribution x \"rivers\" = 1\n";
        let table = reconstruct_report(text, &Params::default()).unwrap();
        assert_eq!(
            to_csv(&table),
            "IterNo,wells,rivers,NetPhi\n1,3,2,5\n2,1,1,2\n"
        );
    }

    #[test]
    fn fractional_values_keep_precision() {
        let text = "Contribution x \"a\" = 1\nContribution x \"b\" = 1\n\
                    Contribution x \"a\" = 1.25E-01\nContribution x \"b\" = 0.5\n";
        let table = reconstruct_report(text, &Params::default()).unwrap();
        let csv = to_csv(&table);
        let mut lines = csv.lines();
        assert_eq!(lines.next(), Some("IterNo,a,b,NetPhi"));
        assert_eq!(lines.next(), Some("1,0.125,0.5,0.625"));
        assert_eq!(lines.next(), None);
    }

    #[test]
    fn existing_file_is_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("case__Data_Table.csv");
        std::fs::write(&path, "stale contents that are longer than the new table\n").unwrap();
        let text = "Contribution x \"a\" = 9\nContribution x \"a\" = 4\n";
        let table = reconstruct_report(text, &Params::default()).unwrap();
        write_table_csv(&table, &path).unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "IterNo,a,NetPhi\n1,4,4\n"
        );
    }
}
