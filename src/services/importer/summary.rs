//! Aggregation of per-row outcomes into an `ImportResult`

use std::collections::BTreeMap;

use crate::types::{
    CanonicalField, ColumnMapping, FieldCompleteness, FileFormat, ImportResult, ImportSummary,
};

use super::validator::{validate_row, RowOutcome};

/// Rejected rows listed in the text report before truncating
const REPORT_MAX_ERRORS: usize = 20;

/// Validate every row, assign ids 1..n to valid rows in order and count field hits
#[cfg(test)]
pub fn summarize(
    filename: &str,
    format: FileFormat,
    sheet: &crate::types::ParsedSheet,
    mapping: ColumnMapping,
) -> ImportResult {
    let mut builder = ResultBuilder::new(filename, format, mapping);
    for row in &sheet.rows {
        builder.push(row);
    }
    builder.finish()
}

/// Validates rows one at a time, so callers can check for cancellation between rows
pub struct ResultBuilder {
    result: ImportResult,
}

impl ResultBuilder {
    pub fn new(filename: &str, format: FileFormat, mapping: ColumnMapping) -> Self {
        let field_hits = mapping.iter().map(|(field, _)| (field, 0)).collect();
        Self {
            result: ImportResult {
                filename: filename.to_string(),
                format,
                total_rows: 0,
                valid_guests: Vec::new(),
                invalid_rows: Vec::new(),
                mapping,
                field_hits,
            },
        }
    }

    pub fn push(&mut self, row: &crate::types::RawRow) {
        let result = &mut self.result;
        result.total_rows += 1;

        for (field, _) in result.mapping.iter() {
            if result.mapping.cell(row, field).is_some() {
                *result.field_hits.entry(field).or_insert(0) += 1;
            }
        }

        let next_id = result.valid_guests.len() as u32 + 1;
        match validate_row(row, &result.mapping, next_id) {
            RowOutcome::Valid(guest) => result.valid_guests.push(guest),
            RowOutcome::Invalid(invalid) => result.invalid_rows.push(invalid),
        }
    }

    pub fn finish(self) -> ImportResult {
        self.result
    }
}

impl ImportResult {
    pub fn hits(&self, field: CanonicalField) -> usize {
        self.field_hits.get(&field).copied().unwrap_or(0)
    }

    pub fn summary(&self) -> ImportSummary {
        let completeness = CanonicalField::ALL
            .iter()
            .filter_map(|field| {
                self.mapping.header(*field).map(|header| FieldCompleteness {
                    field: *field,
                    header: Some(header.to_string()),
                    hits: self.hits(*field),
                    total: self.total_rows,
                })
            })
            .collect();

        ImportSummary {
            filename: self.filename.clone(),
            total_rows: self.total_rows,
            valid_count: self.valid_guests.len(),
            invalid_count: self.invalid_rows.len(),
            completeness,
            unmapped_fields: self.mapping.unmapped(),
        }
    }

    /// Plain-text report for logs and the CLI
    pub fn report(&self) -> String {
        let mut report = format!("Guest import from '{}'\n", self.filename);
        report.push_str(&format!("Total rows: {}\n", self.total_rows));
        report.push_str(&format!("Valid guests: {}\n", self.valid_guests.len()));
        report.push_str(&format!("Rejected rows: {}\n", self.invalid_rows.len()));

        if !self.mapping.is_empty() {
            report.push_str("\nColumns:\n");
            for (field, header) in self.mapping.iter() {
                report.push_str(&format!(
                    "  {} <- '{}': {} of {} rows\n",
                    field.key(),
                    header,
                    self.hits(field),
                    self.total_rows
                ));
            }
        }

        let unmapped = self.mapping.unmapped();
        if !unmapped.is_empty() {
            let keys: Vec<&str> = unmapped.iter().map(|f| f.key()).collect();
            report.push_str(&format!("Not found: {}\n", keys.join(", ")));
        }

        if !self.invalid_rows.is_empty() {
            report.push_str("\nRejected rows:\n");
            for (i, invalid) in self.invalid_rows.iter().take(REPORT_MAX_ERRORS).enumerate() {
                let name = invalid.name.as_deref().unwrap_or("-");
                report.push_str(&format!(
                    "{}. Row {} (line {}, {}): {}\n",
                    i + 1,
                    invalid.row,
                    invalid.line,
                    name,
                    invalid.reason
                ));
            }
            if self.invalid_rows.len() > REPORT_MAX_ERRORS {
                report.push_str(&format!(
                    "... and {} more\n",
                    self.invalid_rows.len() - REPORT_MAX_ERRORS
                ));
            }
        }

        report
    }
}

/// Field key -> hit count, for JSON logs
pub fn hits_by_key(result: &ImportResult) -> BTreeMap<&'static str, usize> {
    result
        .field_hits
        .iter()
        .map(|(field, hits)| (field.key(), *hits))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::importer::{column_mapper::map_columns, parser::parse};
    use crate::types::{InvalidReason, UploadedFile};

    fn run(content: &str) -> ImportResult {
        let file = UploadedFile::new("guests.csv", content.as_bytes().to_vec());
        let sheet = parse(&file).unwrap();
        let mapping = map_columns(&sheet.headers);
        summarize(&file.filename, FileFormat::Csv, &sheet, mapping)
    }

    #[test]
    fn test_scenario_missing_name_row() {
        let result = run("Name,Email\nJohn Smith,john@example.com\n,bad-email\n");

        assert_eq!(result.total_rows, 2);
        assert_eq!(result.valid_guests.len(), 1);
        assert_eq!(result.valid_guests[0].name, "John Smith");
        assert_eq!(result.invalid_rows.len(), 1);
        assert_eq!(result.invalid_rows[0].row, 2);
        assert_eq!(result.invalid_rows[0].reason, InvalidReason::MissingName);
        assert_eq!(result.invalid_rows[0].reason.to_string(), "Missing name");
    }

    #[test]
    fn test_total_equals_valid_plus_invalid() {
        let result = run(
            "Name,Email,Phone\nA,a@x.com,1\n,b@x.com,2\nC,c-at-x.com,\nD,d@x.com,\n,,5\n",
        );
        assert_eq!(result.total_rows, 5);
        assert_eq!(
            result.total_rows,
            result.valid_guests.len() + result.invalid_rows.len()
        );
    }

    #[test]
    fn test_ids_are_sequential_among_valid_rows() {
        let result = run("Name,Email\nA,a@x.com\n,broken\nB,b@x.com\nC,c@x.com\n");
        let ids: Vec<u32> = result.valid_guests.iter().map(|g| g.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        let names: Vec<&str> = result.valid_guests.iter().map(|g| g.name.as_str()).collect();
        assert_eq!(names, vec!["A", "B", "C"]);
    }

    #[test]
    fn test_field_hits_count_all_rows() {
        let result = run("Name,Email,Phone\nA,a@x.com,1\n,b@x.com,\nC,,3\n");
        assert_eq!(result.hits(CanonicalField::Name), 2);
        assert_eq!(result.hits(CanonicalField::Email), 2);
        assert_eq!(result.hits(CanonicalField::Phone), 2);
        assert_eq!(result.hits(CanonicalField::Events), 0);
        assert_eq!(hits_by_key(&result).get("email"), Some(&2));
    }

    #[test]
    fn test_same_input_gives_same_result() {
        let content = "Name,Email,Events\nA,a@x.com,\"Haldi, Wedding\"\n,x\nB,b@x.com,\n";
        assert_eq!(run(content), run(content));
    }

    #[test]
    fn test_summary_lists_completeness_and_unmapped() {
        let result = run("Name,Email\nA,a@x.com\nB,\n");
        let summary = result.summary();

        assert_eq!(summary.total_rows, 2);
        assert_eq!(summary.valid_count, 1);
        assert_eq!(summary.invalid_count, 1);
        assert_eq!(summary.completeness.len(), 2);
        let email = summary
            .completeness
            .iter()
            .find(|c| c.field == CanonicalField::Email)
            .unwrap();
        assert_eq!((email.hits, email.total), (1, 2));
        assert!(summary.unmapped_fields.contains(&CanonicalField::Phone));
        assert!(!summary.unmapped_fields.contains(&CanonicalField::Name));
    }

    #[test]
    fn test_report_truncates_rejected_rows() {
        let mut content = String::from("Name,Email\n");
        for i in 0..25 {
            content.push_str(&format!("Guest {},no-email-{}\n", i, i));
        }
        let report = run(&content).report();

        assert!(report.contains("Total rows: 25"));
        assert!(report.contains("Rejected rows: 25"));
        assert!(report.contains("20. Row 20"));
        assert!(!report.contains("21. Row 21"));
        assert!(report.contains("... and 5 more"));
        assert!(report.contains("email <- 'Email': 25 of 25 rows"));
    }

    #[test]
    fn test_empty_sheet_summarizes_to_zero() {
        let result = run("Name,Email\n");
        assert_eq!(result.total_rows, 0);
        assert!(result.valid_guests.is_empty());
        assert!(result.invalid_rows.is_empty());
    }
}
