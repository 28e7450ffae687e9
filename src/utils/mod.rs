/// Utility functions and helpers
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Generate a unique ID based on timestamp and random component
pub fn generate_id(prefix: &str) -> String {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();

    let random: u32 = rand::random();
    format!("{}-{}-{:x}", prefix, timestamp, random)
}

/// Match `text` against a shell-style glob (`*`, `?`, `[abc]`, `[^abc]`)
///
/// Same matching rules the server applies to `SCAN MATCH`. Escapes with `\`
/// are honoured so that literal metacharacters can be matched.
pub fn glob_match(pattern: &str, text: &str) -> bool {
    let pat: Vec<char> = pattern.chars().collect();
    let txt: Vec<char> = text.chars().collect();

    let mut pi = 0;
    let mut ti = 0;
    // position of the most recent '*' and the text index it was tried at
    let mut star: Option<(usize, usize)> = None;

    while ti < txt.len() {
        if pi < pat.len() {
            match pat[pi] {
                '*' => {
                    star = Some((pi, ti));
                    pi += 1;
                    continue;
                }
                '?' => {
                    pi += 1;
                    ti += 1;
                    continue;
                }
                '[' => {
                    if let Some((matched, next)) = match_class(&pat, pi, txt[ti]) {
                        if matched {
                            pi = next;
                            ti += 1;
                            continue;
                        }
                    } else if txt[ti] == '[' {
                        // unterminated class, treat '[' literally
                        pi += 1;
                        ti += 1;
                        continue;
                    }
                }
                '\\' if pi + 1 < pat.len() => {
                    if pat[pi + 1] == txt[ti] {
                        pi += 2;
                        ti += 1;
                        continue;
                    }
                }
                c if c == txt[ti] => {
                    pi += 1;
                    ti += 1;
                    continue;
                }
                _ => {}
            }
        }

        match star {
            Some((sp, st)) => {
                pi = sp + 1;
                ti = st + 1;
                star = Some((sp, st + 1));
            }
            None => return false,
        }
    }

    pat[pi..].iter().all(|c| *c == '*')
}

/// Evaluate a `[...]` class starting at `start` against `c`.
/// Returns whether it matched and the pattern index after the closing `]`,
/// or `None` when the class is unterminated.
fn match_class(pat: &[char], start: usize, c: char) -> Option<(bool, usize)> {
    let mut j = start + 1;
    let negated = j < pat.len() && (pat[j] == '^' || pat[j] == '!');
    if negated {
        j += 1;
    }

    let mut matched = false;
    while j < pat.len() && pat[j] != ']' {
        if pat[j] == '\\' && j + 1 < pat.len() {
            j += 1;
            matched |= pat[j] == c;
        } else if j + 2 < pat.len() && pat[j + 1] == '-' && pat[j + 2] != ']' {
            let (lo, hi) = if pat[j] <= pat[j + 2] {
                (pat[j], pat[j + 2])
            } else {
                (pat[j + 2], pat[j])
            };
            matched |= lo <= c && c <= hi;
            j += 2;
        } else {
            matched |= pat[j] == c;
        }
        j += 1;
    }

    if j >= pat.len() {
        return None;
    }
    Some((matched != negated, j + 1))
}

/// Compact `1h2m3s` rendering, used for key TTLs
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    let (hours, minutes, seconds) = (secs / 3600, secs / 60 % 60, secs % 60);
    match (hours, minutes) {
        (0, 0) => format!("{}s", seconds),
        (0, _) => format!("{}m{}s", minutes, seconds),
        _ => format!("{}h{}m{}s", hours, minutes, seconds),
    }
}

/// Format a server uptime as days, hours and minutes
pub fn format_uptime(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds as u64
    } else {
        0
    };
    format!(
        "{}d {}h {}m",
        total / 86_400,
        (total % 86_400) / 3600,
        (total % 3600) / 60
    )
}

/// Binary-scaled size with two decimals above 1 KB
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

    let mut scaled = bytes as f64;
    let mut unit = UNITS[0];
    for &next in &UNITS[1..] {
        if scaled < 1024.0 {
            break;
        }
        scaled /= 1024.0;
        unit = next;
    }

    if unit == UNITS[0] {
        format!("{} B", bytes)
    } else {
        format!("{:.2} {}", scaled, unit)
    }
}
