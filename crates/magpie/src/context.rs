//
// context.rs
//
// Human-readable source excerpts around a location
//

use std::path::Path;

use crate::symbol_locator::is_declaration_line;

/// Lines shown on each side of a non-declaration target.
const CONTEXT_WINDOW: usize = 5;

/// Render the context around a 1-based line of `path`.
///
/// Declaration lines expand to the whole declaration body; other lines get
/// a fixed window. Unreadable files and out-of-range lines yield a
/// single-line diagnostic so one bad location never sinks a whole query.
pub fn extract_context(path: &Path, line: u64) -> Vec<String> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(err) => {
            log::error!("Failed to get context from {}: {}", path.display(), err);
            return vec![format!("Error: {}", err)];
        }
    };
    render_context(&text, line)
}

/// Render the context for a 1-based line of in-memory text.
pub fn render_context(text: &str, line: u64) -> Vec<String> {
    let lines: Vec<&str> = text.lines().collect();
    if line == 0 || line as usize > lines.len() {
        return vec![format!("Line {} is out of range", line)];
    }
    let target = line as usize - 1;

    if is_declaration_line(lines[target]) {
        declaration_block(&lines, target)
    } else {
        window(&lines, target)
    }
}

/// The declaration line plus its body, delimited by indentation: blank and
/// comment lines attach unconditionally; the first other line fixes the body
/// indent; the block ends before the first line indented shallower than that.
fn declaration_block(lines: &[&str], target: usize) -> Vec<String> {
    let mut rendered = vec![format!("→ {}: {}", target + 1, lines[target].trim_end())];

    let mut cursor = target + 1;
    let mut body_indent = None;
    while cursor < lines.len() {
        let line = lines[cursor];
        if line.trim().is_empty() || is_comment(line) {
            rendered.push(format!("  {}: {}", cursor + 1, line.trim_end()));
            cursor += 1;
            continue;
        }
        body_indent = Some(indent_width(line));
        break;
    }

    let Some(body_indent) = body_indent else {
        // One-liner or empty declaration; nothing below belongs to it.
        return rendered;
    };

    while cursor < lines.len() {
        let line = lines[cursor];
        if !line.trim().is_empty() && !is_comment(line) && indent_width(line) < body_indent {
            break;
        }
        rendered.push(format!("  {}: {}", cursor + 1, line.trim_end()));
        cursor += 1;
    }
    rendered
}

fn window(lines: &[&str], target: usize) -> Vec<String> {
    let start = target.saturating_sub(CONTEXT_WINDOW);
    let end = (target + CONTEXT_WINDOW + 1).min(lines.len());
    (start..end)
        .map(|i| {
            let marker = if i == target { "→" } else { " " };
            format!("{} {}: {}", marker, i + 1, lines[i].trim_end())
        })
        .collect()
}

fn indent_width(line: &str) -> usize {
    line.len() - line.trim_start().len()
}

fn is_comment(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.starts_with('#') || trimmed.starts_with("//")
}
