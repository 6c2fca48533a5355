//! Chat text handling: outbound line splitting, inbound fragment reassembly
//! and color-code normalization.

/// Characters a single chat frame can hold.
pub const LINE_CAPACITY: usize = 64;

/// Messages longer than this are split into several lines.
pub const SPLIT_THRESHOLD: usize = 62;

/// Characters taken from the source text per split line.
pub const PART_LEN: usize = 60;

/// Capacity of the long-message accumulator.
pub const ASSEMBLER_CAPACITY: usize = 192;

const CONTINUATION_PREFIX: &str = "> ";

/// Message slot on the client screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MessageKind {
    #[default]
    Chat,
    Status1,
    Status2,
    Status3,
    BottomRight1,
    BottomRight2,
    BottomRight3,
    Announcement,
}

impl MessageKind {
    pub fn code(self) -> u8 {
        match self {
            MessageKind::Chat => 0,
            MessageKind::Status1 => 1,
            MessageKind::Status2 => 2,
            MessageKind::Status3 => 3,
            MessageKind::BottomRight1 => 11,
            MessageKind::BottomRight2 => 12,
            MessageKind::BottomRight3 => 13,
            MessageKind::Announcement => 100,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Some(match code {
            0 => MessageKind::Chat,
            1 => MessageKind::Status1,
            2 => MessageKind::Status2,
            3 => MessageKind::Status3,
            11 => MessageKind::BottomRight1,
            12 => MessageKind::BottomRight2,
            13 => MessageKind::BottomRight3,
            100 => MessageKind::Announcement,
            _ => return None,
        })
    }
}

/// Rewrite `%` followed by a hex digit into the `&` color escape.
///
/// Literal percent-hex sequences typed by players are lost.
pub fn rewrite_color_codes(text: &mut String) {
    if !text.contains('%') {
        return;
    }
    let mut chars: Vec<char> = text.chars().collect();
    for i in 0..chars.len().saturating_sub(1) {
        if chars[i] == '%' && chars[i + 1].is_ascii_hexdigit() {
            chars[i] = '&';
        }
    }
    *text = chars.into_iter().collect();
}

/// Replace everything outside printable ASCII with `?` for clients that
/// cannot render code page 437.
pub fn sanitize_legacy(text: &str) -> String {
    text.chars()
        .map(|c| if (' '..='~').contains(&c) { c } else { '?' })
        .collect()
}

/// Split outbound chat into lines that fit one frame.
///
/// Continuation lines start with `> ` and re-apply the last color code seen.
/// A color escape is never separated from its hex digit, `\r` is dropped and
/// `\n` ends the current line.
pub fn split_message(text: &str, kind: MessageKind) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= SPLIT_THRESHOLD || kind != MessageKind::Chat {
        return vec![text.to_string()];
    }

    let mut parts = Vec::new();
    let mut color: Option<char> = None;
    let mut rest: &[char] = &chars;

    while !rest.is_empty() {
        let mut part = String::with_capacity(LINE_CAPACITY);
        if !parts.is_empty() {
            part.push_str(CONTINUATION_PREFIX);
        }
        if let Some(code) = color {
            part.push('&');
            part.push(code);
        }

        let mut take = rest.len().min(PART_LEN);
        if take < rest.len() && rest[take - 1] == '&' && rest[take].is_ascii_hexdigit() {
            take -= 1;
        }

        let mut consumed = take;
        let mut has_content = false;
        for (j, &ch) in rest[..take].iter().enumerate() {
            let next = rest.get(j + 1).copied();
            if ch == '\n' {
                consumed = j + 1;
                break;
            }
            if ch != '\r' {
                part.push(ch);
                has_content = true;
            }
            if ch == '&' && next.is_some_and(|n| n.is_ascii_hexdigit()) {
                color = next;
            }
        }

        if has_content {
            parts.push(part);
        }
        rest = &rest[consumed..];
    }

    parts
}

/// Per-session accumulator for multi-frame messages.
#[derive(Debug, Clone, Default)]
pub struct MessageAssembler {
    buffer: String,
    len: usize,
}

impl MessageAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a fragment. Returns `false` when the fragment did not fit
    /// completely; the stored text is cut at capacity in that case.
    pub fn append(&mut self, fragment: &str) -> bool {
        for ch in fragment.chars() {
            if self.len == ASSEMBLER_CAPACITY {
                return false;
            }
            self.buffer.push(ch);
            self.len += 1;
        }
        true
    }

    pub fn as_str(&self) -> &str {
        &self.buffer
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Hand out the accumulated text and reset.
    pub fn take(&mut self) -> String {
        self.len = 0;
        std::mem::take(&mut self.buffer)
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
        self.len = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_messages_are_not_split() {
        let text = "a".repeat(62);
        assert_eq!(split_message(&text, MessageKind::Chat), vec![text]);
    }

    #[test]
    fn status_messages_are_never_split() {
        let text = "b".repeat(100);
        assert_eq!(split_message(&text, MessageKind::Status1).len(), 1);
    }

    #[test]
    fn long_message_gets_continuation_prefix() {
        let text = "x".repeat(130);
        let parts = split_message(&text, MessageKind::Chat);
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "x".repeat(60));
        assert_eq!(parts[1], format!("> {}", "x".repeat(60)));
        assert_eq!(parts[2], "> xxxxxxxxxx");
        assert!(parts.iter().all(|p| p.chars().count() <= LINE_CAPACITY));
    }

    #[test]
    fn color_carries_into_continuation() {
        let text = format!("&c{}", "r".repeat(70));
        let parts = split_message(&text, MessageKind::Chat);
        assert_eq!(parts.len(), 2);
        assert!(parts[1].starts_with("> &c"));
    }

    #[test]
    fn color_escape_is_not_split_from_digit() {
        let text = format!("{}&a{}", "y".repeat(59), "z".repeat(10));
        let parts = split_message(&text, MessageKind::Chat);
        assert_eq!(parts[0], "y".repeat(59));
        assert!(parts[1].starts_with("> &a"));
    }

    #[test]
    fn newline_breaks_and_carriage_return_is_dropped() {
        let text = format!("first\r\n{}", "q".repeat(70));
        let parts = split_message(&text, MessageKind::Chat);
        assert_eq!(parts[0], "first");
        assert!(parts[1].starts_with("> q"));
    }

    #[test]
    fn percent_hex_becomes_color_escape() {
        let mut text = String::from("100%a done, 50% off, %z");
        rewrite_color_codes(&mut text);
        assert_eq!(text, "100&a done, 50% off, %z");
    }

    #[test]
    fn legacy_clients_get_question_marks() {
        assert_eq!(sanitize_legacy("caf\u{e9} \u{1}ok"), "caf? ?ok");
    }

    #[test]
    fn assembler_joins_fragments() {
        let mut assembler = MessageAssembler::new();
        assert!(assembler.append("Hello "));
        assert!(assembler.append("World"));
        assert_eq!(assembler.take(), "Hello World");
        assert!(assembler.is_empty());
    }

    #[test]
    fn assembler_reports_overflow() {
        let mut assembler = MessageAssembler::new();
        assert!(assembler.append(&"a".repeat(64)));
        assert!(assembler.append(&"b".repeat(64)));
        assert!(assembler.append(&"c".repeat(64)));
        assert!(!assembler.append("d"));
        assert_eq!(assembler.as_str().len(), ASSEMBLER_CAPACITY);
    }

    #[test]
    fn message_kind_codes() {
        assert_eq!(MessageKind::BottomRight2.code(), 12);
        assert_eq!(MessageKind::from_code(100), Some(MessageKind::Announcement));
        assert_eq!(MessageKind::from_code(5), None);
    }
}
