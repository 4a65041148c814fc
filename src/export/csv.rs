use super::{ParticipantRow, PaymentRow};

pub const PARTICIPANT_HEADER: [&str; 10] = [
    "Last name",
    "First name",
    "Email",
    "Phone",
    "Member",
    "Payment status",
    "Places",
    "Checked in",
    "Check-in time",
    "QR code",
];

pub const PAYMENT_HEADER: [&str; 9] = [
    "Date",
    "Participant",
    "Email",
    "Source",
    "Method",
    "Amount",
    "Places",
    "Status",
    "Validated by",
];

/// Quote a field when it holds a comma, quote or line break (RFC 4180).
///
/// Fields a spreadsheet would read as a formula get a leading `'`.
fn escape(field: &str) -> String {
    let field = if field.starts_with(['=', '+', '-', '@', '\t', '\r']) {
        format!("'{}", field)
    } else {
        field.to_string()
    };
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field
    }
}

fn write_line<S: AsRef<str>>(out: &mut String, fields: &[S]) {
    let line: Vec<String> = fields.iter().map(|f| escape(f.as_ref())).collect();
    out.push_str(&line.join(","));
    out.push_str("\r\n");
}

fn render<S: AsRef<str>>(header: &[&str], rows: impl Iterator<Item = Vec<S>>) -> String {
    let mut out = String::new();
    write_line(&mut out, header);
    for row in rows {
        write_line(&mut out, &row);
    }
    out
}

pub fn participants_csv(rows: &[ParticipantRow]) -> String {
    render(&PARTICIPANT_HEADER, rows.iter().map(ParticipantRow::cells))
}

pub fn payments_csv(rows: &[PaymentRow]) -> String {
    render(&PAYMENT_HEADER, rows.iter().map(PaymentRow::cells))
}
