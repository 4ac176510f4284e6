//! Formatting and output helpers.
//!
//! We try to handle both textual output and interactive output (output to a
//! "TTY"). In the case of interactive output, we render with prettier non-ASCII
//! characters and with colors, using shell-specific escape codes.

use cursive_core::theme::{BaseColor, Color, ColorType, Effect, Style};
use cursive_core::utils::markup::StyledString;

/// Glyphs to use for rendering the branch table.
#[derive(Clone, Debug)]
pub struct Glyphs {
    /// Whether or not ANSI escape codes should be emitted (e.g. to render
    /// color).
    pub should_write_ansi_escape_codes: bool,

    /// Drawn repeatedly under the table header.
    pub table_rule: &'static str,

    /// Marks a commit authored by someone other than the current user.
    pub foreign_author: &'static str,

    /// Marks a branch containing a merge commit.
    pub merge_commit: &'static str,
}

impl Glyphs {
    /// Make the `Glyphs` object appropriate for `stdout`.
    pub fn detect() -> Self {
        if console::user_attended() {
            Glyphs::pretty()
        } else {
            Glyphs::text()
        }
    }

    /// Glyphs used for output to a text file or non-TTY.
    pub fn text() -> Self {
        Glyphs {
            should_write_ansi_escape_codes: false,
            table_rule: "-",
            foreign_author: "!",
            merge_commit: "M",
        }
    }

    /// Glyphs used for output to a TTY.
    pub fn pretty() -> Self {
        Glyphs {
            should_write_ansi_escape_codes: true,
            table_rule: "─",
            foreign_author: "!",
            merge_commit: "M",
        }
    }

    /// Render a styled string, with escape codes only if color is enabled.
    pub fn render(&self, string: StyledString) -> eyre::Result<String> {
        let result = string
            .spans()
            .map(|span| {
                if self.should_write_ansi_escape_codes {
                    render_style_as_ansi(span.content, span.attr)
                } else {
                    span.content.to_string()
                }
            })
            .collect();
        Ok(result)
    }

    /// Make `text` a terminal hyperlink to `url` if escape codes are enabled.
    /// Terminals without hyperlink support show `text` alone.
    pub fn hyperlink(&self, text: &str, url: &str) -> String {
        if self.should_write_ansi_escape_codes {
            format!("\x1b]8;;{url}\x1b\\{text}\x1b]8;;\x1b\\")
        } else {
            text.to_owned()
        }
    }
}

fn render_style_as_ansi(content: &str, style: &Style) -> String {
    let Style { effects, color, .. } = style;
    // Whether to color at all was already decided by the caller.
    let plain = console::Style::new().force_styling(true);
    let mut output = match color.front {
        ColorType::Color(Color::Dark(base_color)) => apply_base_color(plain, base_color),
        ColorType::Color(Color::Light(base_color)) => apply_base_color(plain, base_color).bright(),
        // Palette and RGB colors aren't used by this crate.
        _ => plain,
    };
    for effect in effects.iter() {
        output = match effect {
            Effect::Dim => output.dim(),
            Effect::Reverse => output.reverse(),
            Effect::Bold => output.bold(),
            Effect::Italic => output.italic(),
            Effect::Underline => output.underlined(),
            Effect::Blink => output.blink(),
            _ => output,
        };
    }
    output.apply_to(content).to_string()
}

fn apply_base_color(style: console::Style, base_color: BaseColor) -> console::Style {
    match base_color {
        BaseColor::Black => style.black(),
        BaseColor::Red => style.red(),
        BaseColor::Green => style.green(),
        BaseColor::Yellow => style.yellow(),
        BaseColor::Blue => style.blue(),
        BaseColor::Magenta => style.magenta(),
        BaseColor::Cyan => style.cyan(),
        BaseColor::White => style.white(),
    }
}

/// The width of the text of `string` as displayed in a terminal.
pub fn styled_string_width(string: &StyledString) -> usize {
    console::measure_text_width(string.source())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_text_drops_styles() -> eyre::Result<()> {
        let mut string = StyledString::plain("#12 ");
        string.append_styled("open", BaseColor::Green.dark());
        string.append_styled("!", Effect::Bold);
        assert_eq!(Glyphs::text().render(string.clone())?, "#12 open!");
        assert_eq!(styled_string_width(&string), 9);
        Ok(())
    }

    #[test]
    fn test_render_pretty_keeps_text() -> eyre::Result<()> {
        let string = StyledString::styled("main", BaseColor::Green.light());
        let rendered = Glyphs::pretty().render(string)?;
        assert!(rendered.contains("main"));
        assert_eq!(console::strip_ansi_codes(&rendered), "main");
        Ok(())
    }

    #[test]
    fn test_hyperlink() {
        let url = "https://github.com/owner/repo/pull/7";
        assert_eq!(Glyphs::text().hyperlink("#7", url), "#7");
        assert_eq!(
            Glyphs::pretty().hyperlink("#7", url),
            "\x1b]8;;https://github.com/owner/repo/pull/7\x1b\\#7\x1b]8;;\x1b\\"
        );
    }
}
