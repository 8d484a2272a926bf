/// Windows-safe, lowercase dataset name used as the prefix of every export file.
///
/// `"DNS Administration"` becomes `dns_administration`; an empty or fully
/// forbidden input becomes `training`.
pub fn dataset_slug(name: &str) -> String {
    let lowered: String = name
        .trim()
        .chars()
        .map(|c| {
            if is_forbidden(c) || c.is_whitespace() || c == '-' {
                '_'
            } else {
                c.to_ascii_lowercase()
            }
        })
        .collect();

    let mut compacted = String::with_capacity(lowered.len());
    let mut prev_underscore = false;
    for c in lowered.chars() {
        if c == '_' {
            if !prev_underscore {
                compacted.push(c);
            }
            prev_underscore = true;
        } else {
            compacted.push(c);
            prev_underscore = false;
        }
    }

    let mut slug = compacted.trim_matches(&['_', '.'][..]).to_string();
    if slug.is_empty() {
        slug = "training".to_string();
    }
    if slug.len() > 60 {
        let mut cut = 60;
        while !slug.is_char_boundary(cut) {
            cut -= 1;
        }
        slug.truncate(cut);
    }
    if is_reserved_windows_name(&slug) {
        slug.push('_');
    }
    slug
}

fn is_forbidden(c: char) -> bool {
    matches!(c,
        '\\' | '/' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | '\0'..='\u{1F}'
    )
}

fn is_reserved_windows_name(name: &str) -> bool {
    const RESERVED: &[&str] = &[
        "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
        "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
    ];
    RESERVED.iter().any(|r| r.eq_ignore_ascii_case(name))
}

#[cfg(test)]
mod tests {
    use super::dataset_slug;

    #[test]
    fn slug_is_lowercase_and_safe() {
        assert_eq!(dataset_slug("DNS_Administration"), "dns_administration");
        assert_eq!(dataset_slug("  Windows Server: Core / Net  "), "windows_server_core_net");
        assert_eq!(dataset_slug("???"), "training");
        assert_eq!(dataset_slug("nul"), "nul_");
    }
}
