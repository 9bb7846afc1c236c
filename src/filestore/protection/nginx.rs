//! Nginx include rendering. Nginx never reads per-directory files, so the
//! artifact is a `location` block the site configuration has to include.

use super::{Coverage, RuleContext};

pub const FILE_NAME: &str = "protected-files.nginx.conf";

/// Render the block for the URL path `location` (leading and trailing '/').
pub(crate) fn render(rule: &RuleContext<'_>, location: &str) -> String {
    let escaped = regex::escape(location);
    let head = match rule.coverage() {
        Coverage::All => format!("location ^~ {} {{\n", location),
        Coverage::Only(exts) => format!("location ~* ^{}.*\\.({})$ {{\n", escaped, exts),
        Coverage::AllExcept(exts) => format!("location ~* ^{}(?!.*\\.({})$) {{\n", escaped, exts),
    };

    let mut out = format!("# Generated by filewarden; include from the server block of {}.\n", location);
    out.push_str(&head);
    if rule.protection.permalinks_active {
        out.push_str(&format!("    rewrite ^{}(.*)$ {}$1 last;\n", escaped, rule.delivery_target()));
    } else {
        out.push_str("    deny all;\n");
        out.push_str("    return 403;\n");
    }
    out.push_str("}\n");
    out
}
