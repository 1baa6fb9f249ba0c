use crate::infrastructure::error::{CliError, Result};

/// Width of the framed block, in code characters per line
pub const FRAME_WIDTH: usize = 64;

/// How a code reached the user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeDelivery {
    Copied,
    Framed,
}

pub fn copy_to_clipboard(text: &str) -> Result<()> {
    let mut clipboard =
        arboard::Clipboard::new().map_err(|e| CliError::Clipboard(e.to_string()))?;
    clipboard
        .set_text(text.to_owned())
        .map_err(|e| CliError::Clipboard(e.to_string()))
}

/// Wrap `code` in a box, `width` characters per line.
///
/// Codes are URL-safe base64, so splitting on any character boundary is
/// safe; whitespace is stripped again when the code is pasted back.
pub fn framed(code: &str, width: usize) -> String {
    let width = width.max(1);
    let chars: Vec<char> = code.chars().collect();
    let border = "─".repeat(width + 2);

    let mut out = format!("┌{border}┐\n");
    for line in chars.chunks(width) {
        let line: String = line.iter().collect();
        out.push_str(&format!("│ {line:<width$} │\n"));
    }
    out.push_str(&format!("└{border}┘"));
    out
}

/// Recover a code from pasted text that may include the frame.
pub fn unframe(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_whitespace() && !matches!(c, '│' | '─' | '┌' | '┐' | '└' | '┘'))
        .collect()
}

/// Collects a code pasted either as one line or as the whole framed block
#[derive(Debug, Default)]
pub struct PasteBuffer {
    code: String,
}

impl PasteBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one input line; true once the code is complete.
    pub fn push_line(&mut self, line: &str) -> bool {
        let in_frame = line.contains('│') || line.contains('┌');
        self.code.push_str(&unframe(line));
        line.contains('┘') || (!in_frame && !self.code.is_empty())
    }

    pub fn into_code(self) -> String {
        self.code
    }
}

/// Print the code and try to copy it. The framed block is always printed;
/// the clipboard is a convenience on top.
pub fn present_code(label: &str, code: &str, use_clipboard: bool) -> CodeDelivery {
    println!("{label}");
    println!("{}", framed(code, FRAME_WIDTH));

    if !use_clipboard {
        return CodeDelivery::Framed;
    }

    match copy_to_clipboard(code) {
        Ok(()) => {
            println!("📋 Copied to clipboard");
            CodeDelivery::Copied
        }
        Err(e) => {
            tracing::debug!("{}", e);
            println!("Select the block above to copy it");
            CodeDelivery::Framed
        }
    }
}
