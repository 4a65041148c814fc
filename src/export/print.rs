//! Paged table layout for printing or "save as PDF" from the browser.

use serde::Serialize;

pub const DEFAULT_ROWS_PER_PAGE: usize = 30;

#[derive(Debug, Clone, Serialize)]
pub struct TablePage {
    pub page_number: usize,
    pub page_count: usize,
    pub rows: Vec<Vec<String>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PagedTable {
    pub title: String,
    pub columns: Vec<String>,
    pub pages: Vec<TablePage>,
}

/// Split rows into pages; an empty table still yields one page
pub fn paginate(title: &str, columns: &[&str], rows: Vec<Vec<String>>, rows_per_page: usize) -> PagedTable {
    let per_page = rows_per_page.max(1);
    let mut chunks: Vec<Vec<Vec<String>>> = Vec::new();
    let mut rows = rows.into_iter().peekable();
    while rows.peek().is_some() {
        chunks.push(rows.by_ref().take(per_page).collect());
    }
    if chunks.is_empty() {
        chunks.push(Vec::new());
    }

    let page_count = chunks.len();
    PagedTable {
        title: title.to_string(),
        columns: columns.iter().map(|c| c.to_string()).collect(),
        pages: chunks
            .into_iter()
            .enumerate()
            .map(|(i, rows)| TablePage {
                page_number: i + 1,
                page_count,
                rows,
            })
            .collect(),
    }
}

/// Escape HTML special characters
pub fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

/// Standalone HTML document, one table per page with the header repeated
pub fn render_print_html(table: &PagedTable, generated_at: &str) -> String {
    let title = html_escape(&table.title);
    let header: String = table
        .columns
        .iter()
        .map(|c| format!("<th>{}</th>", html_escape(c)))
        .collect();

    let mut body = String::new();
    for page in &table.pages {
        body.push_str("<section class=\"page\">\n");
        body.push_str(&format!("<h1>{}</h1>\n", title));
        body.push_str(&format!("<table>\n<thead><tr>{}</tr></thead>\n<tbody>\n", header));
        for row in &page.rows {
            let cells: String = row
                .iter()
                .map(|c| format!("<td>{}</td>", html_escape(c)))
                .collect();
            body.push_str(&format!("<tr>{}</tr>\n", cells));
        }
        body.push_str("</tbody>\n</table>\n");
        body.push_str(&format!(
            "<footer>Generated {} - page {} / {}</footer>\n</section>\n",
            html_escape(generated_at),
            page.page_number,
            page.page_count
        ));
    }

    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <title>{title}</title>
    <style>
        body {{ font-family: Arial, sans-serif; font-size: 11px; margin: 0; }}
        .page {{ padding: 16mm 12mm; page-break-after: always; }}
        .page:last-child {{ page-break-after: auto; }}
        h1 {{ font-size: 16px; margin: 0 0 8px 0; }}
        table {{ width: 100%; border-collapse: collapse; }}
        th, td {{ border: 1px solid #999; padding: 3px 5px; text-align: left; }}
        th {{ background: #eee; }}
        footer {{ margin-top: 8px; color: #666; text-align: right; }}
        @page {{ size: A4 landscape; margin: 0; }}
    </style>
</head>
<body onload="window.print()">
{body}</body>
</html>"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(n: usize) -> Vec<Vec<String>> {
        (0..n).map(|i| vec![format!("row{}", i), "x".to_string()]).collect()
    }

    #[test]
    fn test_paginate_splits_rows() {
        let table = paginate("Participants", &["Name", "Status"], rows(65), 30);
        assert_eq!(table.pages.len(), 3);
        assert_eq!(table.pages[2].rows.len(), 5);
        assert!(table.pages.iter().all(|p| p.page_count == 3));
        assert_eq!(table.pages[1].page_number, 2);
        assert_eq!(table.pages[1].rows[0][0], "row30");
    }

    #[test]
    fn test_empty_input_yields_one_page() {
        let table = paginate("Participants", &["Name"], Vec::new(), 30);
        assert_eq!(table.pages.len(), 1);
        assert!(table.pages[0].rows.is_empty());
    }

    #[test]
    fn test_render_repeats_header_and_escapes() {
        let table = paginate("Guests <VIP>", &["Name", "Status"], rows(3), 2);
        let html = render_print_html(&table, "2026-03-01 10:00");

        assert_eq!(html.matches("<th>Name</th>").count(), 2);
        assert!(html.contains("Guests &lt;VIP&gt;"));
        assert!(html.contains("page 2 / 2"));
        assert!(html.contains("page-break-after"));
    }

    #[test]
    fn test_single_quotes_are_escaped() {
        let table = paginate("O'Brien's guests", &["Name"], vec![vec!["<b>D'Arcy</b>".to_string()]], 30);
        let html = render_print_html(&table, "2026-03-01 10:00");

        assert!(html.contains("O&#39;Brien&#39;s guests"));
        assert!(html.contains("<td>&lt;b&gt;D&#39;Arcy&lt;/b&gt;</td>"));
        assert!(!html.contains("D'Arcy"));
        assert_eq!(html_escape(r#"a&'"<>"#), "a&amp;&#39;&quot;&lt;&gt;");
    }
}
