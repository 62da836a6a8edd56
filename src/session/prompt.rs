//! Prompt detection and output cleanup for the RouterOS console

use std::sync::LazyLock;

use regex::Regex;

/// Matches a RouterOS prompt line such as `[admin@MikroTik] >` or `[admin@gw] /ip>`
pub const DEFAULT_PROMPT_PATTERN: &str = r"^\[[^\[\]@\r\n]+@[^\[\]\r\n]+\]\s*[^\r\n>]*>\s*$";

static ANSI_ESCAPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\x1b\[[0-9;?]*[A-Za-z]|\x1b[()][0-9A-Za-z]|\x1b[=>]")
        .expect("valid ANSI escape pattern")
});

/// Strip terminal control sequences and carriage returns
pub fn strip_terminal_noise(raw: &str) -> String {
    ANSI_ESCAPE.replace_all(raw, "").replace('\r', "")
}

#[derive(Debug, Clone)]
pub struct PromptMatcher {
    pattern: Regex,
}

impl PromptMatcher {
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            pattern: Regex::new(pattern)?,
        })
    }

    /// True when the last non-blank line of `buffer` is a prompt
    pub fn ends_with_prompt(&self, buffer: &str) -> bool {
        buffer
            .lines()
            .rev()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .is_some_and(|line| self.is_prompt(line))
    }

    pub fn is_prompt(&self, line: &str) -> bool {
        self.pattern.is_match(line.trim())
    }

    /// Prompt lines, and command lines typed after a prompt
    pub fn is_prompt_artifact(&self, line: &str) -> bool {
        let line = line.trim();
        if self.is_prompt(line) {
            return true;
        }
        // `[admin@gw] > /interface print` echoes carry the prompt as a prefix
        let Some(end) = line.strip_prefix('[').and_then(|rest| rest.find(']')) else {
            return false;
        };
        let (host, rest) = line[1..].split_at(end);
        host.contains('@') && rest[1..].trim_start().starts_with('>')
    }
}

impl Default for PromptMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_PROMPT_PATTERN).expect("valid default prompt pattern")
    }
}

/// Output of one command split into regular and error lines
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

/// `key: value` line of a printed record, e.g. `rx-error: 0`
fn is_field_line(line: &str) -> bool {
    let Some((key, _)) = line.split_once(':') else {
        return false;
    };
    let key = key.trim();
    !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | ' ' | '.'))
}

fn is_error_line(line: &str) -> bool {
    let lower = line.to_ascii_lowercase();
    (lower.contains("error") || lower.contains("failed")) && !is_field_line(line)
}

/// Turn the raw console buffer for `command` into cleaned output
///
/// Lines are trimmed, blanks dropped, prompt artifacts and the echoed
/// command removed. Lines mentioning `error` or `failed` go to stderr
/// unless they are record fields, whose values may contain those words.
pub fn split_output(matcher: &PromptMatcher, raw: &str, command: &str) -> CommandOutput {
    let cleaned = strip_terminal_noise(raw);
    let command = command.trim();
    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    let mut echo_seen = command.is_empty();

    for line in cleaned.lines().map(str::trim) {
        if line.is_empty() || matcher.is_prompt_artifact(line) {
            continue;
        }
        if !echo_seen && line.ends_with(command) {
            echo_seen = true;
            continue;
        }
        if is_error_line(line) {
            stderr.push(line);
        } else {
            stdout.push(line);
        }
    }

    CommandOutput {
        stdout: stdout.join("\n"),
        stderr: stderr.join("\n"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detects_prompt_at_end_of_buffer() {
        let matcher = PromptMatcher::default();
        assert!(matcher.ends_with_prompt("banner\r\n[admin@MikroTik] > "));
        assert!(matcher.ends_with_prompt("[admin@gw] /ip firewall> \n\n"));
        assert!(!matcher.ends_with_prompt("[admin@MikroTik] > /interface print\r\nname: ether1\r\n"));
        assert!(!matcher.ends_with_prompt("Password:"));
    }

    #[test]
    fn test_strip_ansi_sequences() {
        let raw = "\x1b[9999B\x1b[m[admin@MikroTik] > \r";
        assert_eq!(strip_terminal_noise(raw), "[admin@MikroTik] > ");
    }

    #[test]
    fn test_split_output_drops_echo_and_prompts() {
        let matcher = PromptMatcher::default();
        let raw = "/interface print detail\r\nFlags: X - disabled\r\nname: ether1\r\n\r\n[admin@MikroTik] > ";
        let out = split_output(&matcher, raw, "/interface print detail");
        assert_eq!(out.stdout, "Flags: X - disabled\nname: ether1");
        assert!(out.stderr.is_empty());
    }

    #[test]
    fn test_split_output_drops_prompt_prefixed_echo() {
        let matcher = PromptMatcher::default();
        let raw = "[admin@MikroTik] > /system resource print\r\nuptime: 3d\r\n[admin@MikroTik] > ";
        let out = split_output(&matcher, raw, "/system resource print");
        assert_eq!(out.stdout, "uptime: 3d");
    }

    #[test]
    fn test_split_output_routes_error_lines() {
        let matcher = PromptMatcher::default();
        let raw = "/queue simple add name=\"x\"\r\nfailure: already have such name\r\ninput does not match any value of target\r\nsyntax error (line 1 column 5)\r\n[admin@MikroTik] > ";
        let out = split_output(&matcher, raw, "/queue simple add name=\"x\"");
        assert_eq!(out.stderr, "syntax error (line 1 column 5)");
        assert_eq!(
            out.stdout,
            "failure: already have such name\ninput does not match any value of target"
        );
    }

    #[test]
    fn test_error_words_in_record_fields_stay_on_stdout() {
        let matcher = PromptMatcher::default();
        let raw = "/interface print detail\r\nname: ether2\r\ncomment: failed-over uplink\r\nrx-error: 0\r\n[admin@MikroTik] > ";
        let out = split_output(&matcher, raw, "/interface print detail");
        assert_eq!(out.stdout, "name: ether2\ncomment: failed-over uplink\nrx-error: 0");
        assert!(out.stderr.is_empty());
    }
}
