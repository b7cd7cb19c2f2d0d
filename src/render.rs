use console::Style;
use syntect::easy::HighlightLines;
use syntect::highlighting::{Color, FontStyle, Style as SyntectStyle, Theme, ThemeSet};
use syntect::parsing::SyntaxSet;
use syntect::util::LinesWithEndings;

const THEME_NAME: &str = "base16-ocean.dark";

/// Highlights markdown answers for a terminal.
pub struct MarkdownFormatter {
    syntax_set: SyntaxSet,
    theme: Theme,
}

impl MarkdownFormatter {
    pub fn new() -> Self {
        let syntax_set = SyntaxSet::load_defaults_newlines();
        let theme = ThemeSet::load_defaults()
            .themes
            .remove(THEME_NAME)
            .unwrap_or_default();
        Self { syntax_set, theme }
    }

    /// Returns `text` with ANSI escapes added. Stripping the escapes gives
    /// back the original text.
    pub fn render(&self, text: &str) -> String {
        let syntax = self
            .syntax_set
            .find_syntax_by_extension("md")
            .unwrap_or_else(|| self.syntax_set.find_syntax_plain_text());
        let mut highlighter = HighlightLines::new(syntax, &self.theme);

        let mut rendered = String::with_capacity(text.len() * 2);
        for line in LinesWithEndings::from(text) {
            let ranges = highlighter
                .highlight_line(line, &self.syntax_set)
                .unwrap_or_else(|_| vec![(SyntectStyle::default(), line)]);
            rendered.push_str(&to_ansi_terminal_escaped(&ranges));
        }
        rendered
    }
}

impl Default for MarkdownFormatter {
    fn default() -> Self {
        Self::new()
    }
}

fn to_ansi_terminal_escaped(ranges: &[(SyntectStyle, &str)]) -> String {
    let mut escaped = String::new();

    for (hl_style, text) in ranges {
        let body = text.trim_end_matches('\n');
        if !body.is_empty() {
            escaped.push_str(&terminal_style(hl_style).apply_to(body).to_string());
        }
        escaped.push_str(&text[body.len()..]);
    }

    escaped
}

fn terminal_style(hl_style: &SyntectStyle) -> Style {
    let mut style = Style::new().force_styling(true);
    if hl_style.font_style.contains(FontStyle::BOLD) {
        style = style.bold();
    }
    if hl_style.font_style.contains(FontStyle::ITALIC) {
        style = style.italic();
    }
    if hl_style.font_style.contains(FontStyle::UNDERLINE) {
        style = style.underlined();
    }

    // Alpha zero marks a palette index instead of an RGB color.
    let fg = hl_style.foreground;
    if fg.a == 0 {
        match fg.r {
            0x00 => style.black(),
            0x01 => style.red(),
            0x02 => style.green(),
            0x03 => style.yellow(),
            0x04 => style.blue(),
            0x05 => style.magenta(),
            0x06 => style.cyan(),
            0x07 => style.white(),
            index => style.color256(index),
        }
    } else {
        style.color256(ansi256(fg))
    }
}

/// Nearest entry of the 6x6x6 color cube.
fn ansi256(color: Color) -> u8 {
    let level = |channel: u8| (u16::from(channel) * 5 / 255) as u8;
    16 + 36 * level(color.r) + 6 * level(color.g) + level(color.b)
}
