//! `.htaccess` rendering for Apache-fronted sites.

use super::{Coverage, RuleContext};

pub const FILE_NAME: &str = ".htaccess";

pub(crate) fn render(rule: &RuleContext<'_>) -> String {
    let mut out = String::from("# Generated by filewarden. Changes are overwritten on the next settings sync.\n");
    if rule.protection.permalinks_active {
        let target = rule.delivery_target();
        out.push_str("<IfModule mod_rewrite.c>\n");
        out.push_str("RewriteEngine On\n");
        out.push_str(&format!("RewriteBase {}\n", rule.protection.home_path));
        match rule.coverage() {
            Coverage::All => {}
            Coverage::Only(exts) => {
                out.push_str(&format!("RewriteCond %{{REQUEST_FILENAME}} \\.({})$ [NC]\n", exts));
            }
            Coverage::AllExcept(exts) => {
                out.push_str(&format!("RewriteCond %{{REQUEST_FILENAME}} !\\.({})$ [NC]\n", exts));
            }
        }
        out.push_str(&format!("RewriteRule ^(.*)$ {}$1 [QSA,L]\n", target));
        out.push_str("</IfModule>\n");
    } else {
        match rule.coverage() {
            Coverage::All => out.push_str("Require all denied\n"),
            Coverage::Only(exts) => {
                out.push_str(&format!("<FilesMatch \"(?i)\\.({})$\">\nRequire all denied\n</FilesMatch>\n", exts));
            }
            Coverage::AllExcept(exts) => {
                out.push_str(&format!("<FilesMatch \"(?i)^(?!.*\\.({})$).*$\">\nRequire all denied\n</FilesMatch>\n", exts));
            }
        }
    }
    out
}
