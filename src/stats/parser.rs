/// Turn `INFO` reports into typed snapshots

use crate::core::ServerSnapshot;
use crate::driver::InfoSection;
use std::str::FromStr;

/// Split a raw `INFO` reply into sections.
///
/// `# Name` lines open a section, `key:value` lines add fields to the open
/// one. Blank lines and lines without a `:` are skipped. Fields that appear
/// before the first header land in a section with an empty name.
pub fn parse_info_text(text: &str) -> Vec<InfoSection> {
    let mut sections: Vec<InfoSection> = Vec::new();

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if let Some(header) = line.strip_prefix('#') {
            sections.push(InfoSection::new(header.trim()));
            continue;
        }

        let Some((key, value)) = line.split_once(':') else {
            continue;
        };

        if sections.is_empty() {
            sections.push(InfoSection::new(""));
        }
        if let Some(section) = sections.last_mut() {
            section
                .fields
                .push((key.trim().to_string(), value.trim().to_string()));
        }
    }

    sections
}

/// Extract the snapshot fields from a sectioned report.
///
/// Keys match case-insensitively across all sections. A value that fails to
/// parse leaves the field at whatever it held before (zero unless an earlier
/// section supplied it). `total_keys` is not part of the report and stays 0.
pub fn parse_snapshot(sections: &[InfoSection]) -> ServerSnapshot {
    let mut snapshot = ServerSnapshot::default();

    for (key, value) in sections.iter().flat_map(|s| s.fields.iter()) {
        match key.to_ascii_lowercase().as_str() {
            "redis_version" => snapshot.version = value.clone(),
            "used_memory" => parse_into(value, &mut snapshot.used_memory),
            "connected_clients" => parse_into(value, &mut snapshot.connected_clients),
            "total_commands_processed" => {
                parse_into(value, &mut snapshot.total_commands_processed)
            }
            "uptime_in_seconds" => parse_into(value, &mut snapshot.uptime_seconds),
            _ => {}
        }
    }

    snapshot
}

fn parse_into<T: FromStr>(value: &str, field: &mut T) {
    if let Ok(parsed) = value.trim().parse::<T>() {
        *field = parsed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "# Server\r\n\
        redis_version:7.2.4\r\n\
        redis_mode:standalone\r\n\
        uptime_in_seconds:86400\r\n\
        \r\n\
        # Clients\r\n\
        connected_clients:12\r\n\
        \r\n\
        # Memory\r\n\
        used_memory:1048576\r\n\
        used_memory_human:1.00M\r\n\
        \r\n\
        # Stats\r\n\
        total_commands_processed:99999\r\n\
        \r\n\
        # Keyspace\r\n\
        db0:keys=10,expires=2,avg_ttl=0\r\n";

    #[test]
    fn test_parse_info_text_sections() {
        let sections = parse_info_text(SAMPLE);
        let names: Vec<&str> = sections.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Server", "Clients", "Memory", "Stats", "Keyspace"]);
        assert_eq!(
            sections[4].fields[0],
            ("db0".to_string(), "keys=10,expires=2,avg_ttl=0".to_string())
        );
    }

    #[test]
    fn test_parse_info_text_without_headers() {
        let sections = parse_info_text("redis_version:6.0.0\nnot a field\n");
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].name, "");
        assert_eq!(sections[0].fields.len(), 1);
    }

    #[test]
    fn test_parse_snapshot_full_report() {
        let snapshot = parse_snapshot(&parse_info_text(SAMPLE));
        assert_eq!(snapshot.version, "7.2.4");
        assert_eq!(snapshot.used_memory, 1_048_576);
        assert_eq!(snapshot.connected_clients, 12);
        assert_eq!(snapshot.total_commands_processed, 99_999);
        assert_eq!(snapshot.uptime_seconds, 86_400.0);
        assert_eq!(snapshot.total_keys, 0);
    }

    #[test]
    fn test_unknown_field_between_known_fields() {
        let sections = vec![InfoSection::new("Mixed")
            .with_field("redis_version", "7.0.11")
            .with_field("mystery_field", "???")
            .with_field("used_memory", "2048")];

        let snapshot = parse_snapshot(&sections);
        assert_eq!(snapshot.version, "7.0.11");
        assert_eq!(snapshot.used_memory, 2048);
    }

    #[test]
    fn test_malformed_numbers_keep_defaults() {
        let sections = vec![InfoSection::new("Broken")
            .with_field("used_memory", "lots")
            .with_field("connected_clients", "-3")
            .with_field("uptime_in_seconds", "12.5")];

        let snapshot = parse_snapshot(&sections);
        assert_eq!(snapshot.used_memory, 0);
        assert_eq!(snapshot.connected_clients, 0);
        assert_eq!(snapshot.uptime_seconds, 12.5);
    }

    #[test]
    fn test_keys_match_case_insensitively() {
        let sections = vec![InfoSection::new("Server")
            .with_field("REDIS_VERSION", "6.2.0")
            .with_field("Connected_Clients", "4")];

        let snapshot = parse_snapshot(&sections);
        assert_eq!(snapshot.version, "6.2.0");
        assert_eq!(snapshot.connected_clients, 4);
    }

    #[test]
    fn test_bad_duplicate_keeps_earlier_value() {
        let sections = vec![
            InfoSection::new("Memory").with_field("used_memory", "4096"),
            InfoSection::new("Extra").with_field("used_memory", "n/a"),
        ];
        assert_eq!(parse_snapshot(&sections).used_memory, 4096);
    }

    #[test]
    fn test_empty_report() {
        assert!(parse_snapshot(&[]).is_empty());
    }
}
