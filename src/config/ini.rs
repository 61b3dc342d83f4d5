use crate::config::{ConfigError, Result};

#[derive(Debug, Default, PartialEq)]
pub struct Ini {
    sections: Vec<Section>,
}

#[derive(Debug, PartialEq)]
pub struct Section {
    name: String,
    entries: Vec<(String, String)>,
}

impl Ini {
    pub fn parse(text: &str) -> Result<Ini> {
        let mut ini = Ini::default();

        for (idx, raw) in text.lines().enumerate() {
            let line_no = idx + 1;
            let line = raw.trim();

            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }

            if let Some(header) = line.strip_prefix('[') {
                let name = header
                    .strip_suffix(']')
                    .map(str::trim)
                    .filter(|n| !n.is_empty())
                    .ok_or_else(|| parse_error(line_no, "malformed section header"))?;

                if ini.section(name).is_some() {
                    return Err(parse_error(line_no, &format!("duplicate section '{}'", name)));
                }
                ini.sections.push(Section {
                    name: name.to_string(),
                    entries: Vec::new(),
                });
                continue;
            }

            let (key, value) = split_assignment(line)
                .ok_or_else(|| parse_error(line_no, "expected 'key = value'"))?;

            let section = ini
                .sections
                .last_mut()
                .ok_or_else(|| parse_error(line_no, "key outside of any section"))?;
            section.entries.push((key.to_string(), value.to_string()));
        }

        Ok(ini)
    }

    /// Section lookup ignores case.
    pub fn section(&self, name: &str) -> Option<&Section> {
        self.sections
            .iter()
            .find(|s| s.name.eq_ignore_ascii_case(name))
    }

    pub fn sections(&self) -> impl Iterator<Item = &Section> {
        self.sections.iter()
    }
}

impl Section {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Last value assigned to `key`, ignoring case.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .rev()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// Entries in file order, keys as written.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

fn split_assignment(line: &str) -> Option<(&str, &str)> {
    let pos = line.find(['=', ':'])?;
    let key = line[..pos].trim();
    if key.is_empty() {
        return None;
    }
    Some((key, line[pos + 1..].trim()))
}

fn parse_error(line: usize, reason: &str) -> ConfigError {
    ConfigError::Parse {
        line,
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_sections_and_keys() {
        let text = "\
# leading comment
[Global]
ssid = lab
key: hunter2hunter2

; another comment
[web]
redirect_port=8080
";
        let ini = Ini::parse(text).unwrap();
        let names: Vec<&str> = ini.sections().map(|s| s.name()).collect();
        assert_eq!(names, vec!["Global", "web"]);

        let global = ini.section("global").unwrap();
        assert_eq!(global.get("SSID"), Some("lab"));
        assert_eq!(global.get("key"), Some("hunter2hunter2"));
        assert_eq!(ini.section("web").unwrap().get("redirect_port"), Some("8080"));
    }

    #[test]
    fn test_value_keeps_embedded_separators() {
        let ini = Ini::parse("[Global]\nhosts = a:1.2.3.4,b:5.6.7.8\n").unwrap();
        assert_eq!(
            ini.section("Global").unwrap().get("hosts"),
            Some("a:1.2.3.4,b:5.6.7.8")
        );
    }

    #[test]
    fn test_last_assignment_wins() {
        let ini = Ini::parse("[s]\na=1\nA=2\n").unwrap();
        let section = ini.section("s").unwrap();
        assert_eq!(section.get("a"), Some("2"));
        assert_eq!(section.entries().count(), 2);
    }

    #[test]
    fn test_key_outside_section() {
        let err = Ini::parse("ssid = lab\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { line: 1, .. }));
    }

    #[test]
    fn test_duplicate_section() {
        let err = Ini::parse("[a]\n[b]\n[A]\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { line: 3, .. }));
    }

    #[test]
    fn test_garbage_line() {
        let err = Ini::parse("[a]\njust words\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { line: 2, .. }));
    }

    #[test]
    fn test_malformed_header() {
        assert!(Ini::parse("[oops\n").is_err());
        assert!(Ini::parse("[]\n").is_err());
    }
}
