use crate::db::ResultSet;
use std::borrow::Cow;
use std::fmt::Write;

pub const NO_RESULTS: &str = "No results found";
const NULL_TEXT: &str = "NULL";

/// Renders rows as a markdown table.
///
/// Headers are the column names when known, otherwise `Column 1`,
/// `Column 2`, ... . Each separator dash run is as long as its header.
pub fn format_markdown_results(results: &ResultSet) -> String {
    if results.is_empty() {
        return NO_RESULTS.to_string();
    }

    let headers: Vec<Cow<'_, str>> = match &results.columns {
        Some(columns) if !columns.is_empty() => columns.iter().map(|c| cell(c)).collect(),
        _ => (1..=results.rows[0].len())
            .map(|i| Cow::Owned(format!("Column {}", i)))
            .collect(),
    };

    let mut markdown = String::new();

    let _ = writeln!(markdown, "| {} |", headers.join(" | "));

    let dashes: Vec<String> = headers
        .iter()
        .map(|header| "-".repeat(header.chars().count()))
        .collect();
    let _ = writeln!(markdown, "|-{}-|", dashes.join("-|-"));

    for row in &results.rows {
        let values: Vec<Cow<'_, str>> = row
            .iter()
            .map(|value| cell(value.as_deref().unwrap_or(NULL_TEXT)))
            .collect();
        let _ = writeln!(markdown, "| {} |", values.join(" | "));
    }

    markdown
}

// Keeps one table row per line and one cell per pipe
fn cell(text: &str) -> Cow<'_, str> {
    if text.contains(['|', '\n', '\r']) {
        Cow::Owned(
            text.replace('|', "\\|")
                .replace("\r\n", " ")
                .replace(['\n', '\r'], " "),
        )
    } else {
        Cow::Borrowed(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_rows(rows: &[&[&str]]) -> Vec<Vec<Option<String>>> {
        rows.iter()
            .map(|row| row.iter().map(|v| Some(v.to_string())).collect())
            .collect()
    }

    #[test]
    fn empty_result_is_sentinel() {
        assert_eq!(format_markdown_results(&ResultSet::default()), "No results found");

        let named_but_empty = ResultSet {
            columns: Some(vec!["id".to_string()]),
            rows: Vec::new(),
        };
        assert_eq!(format_markdown_results(&named_but_empty), NO_RESULTS);
    }

    #[test]
    fn positional_headers_without_names() {
        let results = ResultSet {
            columns: None,
            rows: text_rows(&[&["42"]]),
        };

        assert_eq!(
            format_markdown_results(&results),
            "| Column 1 |\n|----------|\n| 42 |\n"
        );
    }

    #[test]
    fn named_headers_and_null_values() {
        let results = ResultSet {
            columns: Some(vec!["id".to_string(), "full_name".to_string()]),
            rows: vec![
                vec![Some("1".to_string()), Some("Ada Lovelace".to_string())],
                vec![Some("2".to_string()), None],
            ],
        };

        assert_eq!(
            format_markdown_results(&results),
            "| id | full_name |\n|----|-----------|\n| 1 | Ada Lovelace |\n| 2 | NULL |\n"
        );
    }

    #[test]
    fn separator_runs_match_header_lengths_and_cells_match_headers() {
        let results = ResultSet {
            columns: Some(vec!["a".to_string(), "département".to_string(), "total_count".to_string()]),
            rows: text_rows(&[&["1", "x", "3"], &["4", "y", "6"]]),
        };

        let markdown = format_markdown_results(&results);
        let lines: Vec<&str> = markdown.lines().collect();
        assert_eq!(lines.len(), 4);

        let runs: Vec<usize> = lines[1]
            .trim_matches('|')
            .split('|')
            .map(|run| run.len() - 2)
            .collect();
        assert_eq!(runs, vec![1, "département".chars().count(), 11]);

        for line in &lines {
            assert_eq!(line.matches('|').count(), 4);
        }
    }

    #[test]
    fn pipes_and_newlines_in_values_stay_in_their_cell() {
        let results = ResultSet {
            columns: Some(vec!["note".to_string()]),
            rows: text_rows(&[&["a|b\nc"]]),
        };

        assert_eq!(
            format_markdown_results(&results),
            "| note |\n|------|\n| a\\|b c |\n"
        );
    }
}
