use pulldown_cmark::{CodeBlockKind, Event, HeadingLevel, Options, Parser, Tag, TagEnd};

const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";
const ITALIC: &str = "\x1b[3m";
const UNDERLINE: &str = "\x1b[4m";
const STRIKE: &str = "\x1b[9m";
const CYAN: &str = "\x1b[36m";

/// Render markdown as ANSI-styled terminal text.
pub fn render_markdown(input: &str) -> String {
    let options = Options::ENABLE_STRIKETHROUGH | Options::ENABLE_TABLES;
    let mut renderer = Renderer::default();
    for event in Parser::new_ext(input, options) {
        renderer.handle(event);
    }
    renderer.finish()
}

#[derive(Default)]
struct Renderer {
    out: String,
    bold: u32,
    italic: u32,
    strike: u32,
    heading: bool,
    link_url: Option<String>,
    in_code_block: bool,
    quote_depth: usize,
    // One entry per open list: the next ordinal, or None for bullets
    lists: Vec<Option<u64>>,
    // Cells already written in the current table row
    table_cells: usize,
    at_line_start: bool,
}

impl Renderer {
    fn handle(&mut self, event: Event) {
        match event {
            Event::Start(tag) => self.start(tag),
            Event::End(tag) => self.end(tag),
            Event::Text(text) => {
                if self.in_code_block {
                    self.code_text(&text);
                } else {
                    self.write(&text);
                }
            }
            Event::Code(code) => {
                self.write_raw(CYAN);
                self.write(&code);
                self.restyle();
            }
            Event::SoftBreak => self.write(" "),
            Event::HardBreak => self.newline(),
            Event::Rule => {
                self.block_break();
                self.write_raw(DIM);
                self.write("────────────────────────");
                self.restyle();
                self.block_break();
            }
            _ => {}
        }
    }

    fn start(&mut self, tag: Tag) {
        match tag {
            Tag::Heading { level, .. } => {
                self.block_break();
                self.heading = true;
                self.restyle();
                let hashes = "#".repeat(heading_level(level));
                self.write(&format!("{} ", hashes));
            }
            Tag::Strong => {
                self.bold += 1;
                self.restyle();
            }
            Tag::Emphasis => {
                self.italic += 1;
                self.restyle();
            }
            Tag::Strikethrough => {
                self.strike += 1;
                self.restyle();
            }
            Tag::Link { dest_url, .. } => {
                self.link_url = Some(dest_url.to_string());
                self.write_raw(UNDERLINE);
            }
            Tag::CodeBlock(kind) => {
                self.block_break();
                self.in_code_block = true;
                let lang = match kind {
                    CodeBlockKind::Fenced(lang) => lang.trim().to_string(),
                    CodeBlockKind::Indented => String::new(),
                };
                self.write_raw(DIM);
                self.write(&format!("```{}", lang));
                self.restyle();
                self.newline();
            }
            Tag::BlockQuote(_) => {
                self.block_break();
                self.quote_depth += 1;
            }
            Tag::List(start) => {
                if self.lists.is_empty() {
                    self.block_break();
                } else if !self.at_line_start {
                    self.newline();
                }
                self.lists.push(start);
            }
            Tag::Table(_) => self.block_break(),
            Tag::TableHead => {
                self.table_cells = 0;
                self.bold += 1;
                self.restyle();
            }
            Tag::TableRow => {
                if !self.at_line_start {
                    self.newline();
                }
                self.table_cells = 0;
            }
            Tag::TableCell => {
                if self.table_cells > 0 {
                    self.write(" │ ");
                }
                self.table_cells += 1;
            }
            Tag::Item => {
                if !self.at_line_start {
                    self.newline();
                }
                let depth = self.lists.len().saturating_sub(1);
                let marker = match self.lists.last_mut() {
                    Some(Some(n)) => {
                        let marker = format!("{}. ", n);
                        *n += 1;
                        marker
                    }
                    _ => "• ".to_string(),
                };
                self.write(&format!("{}{}", "  ".repeat(depth), marker));
            }
            _ => {}
        }
    }

    fn end(&mut self, tag: TagEnd) {
        match tag {
            TagEnd::Paragraph => {
                if self.lists.is_empty() {
                    self.block_break();
                }
            }
            TagEnd::Heading(_) => {
                self.heading = false;
                self.restyle();
                self.block_break();
            }
            TagEnd::Strong => {
                self.bold = self.bold.saturating_sub(1);
                self.restyle();
            }
            TagEnd::Emphasis => {
                self.italic = self.italic.saturating_sub(1);
                self.restyle();
            }
            TagEnd::Strikethrough => {
                self.strike = self.strike.saturating_sub(1);
                self.restyle();
            }
            TagEnd::Link => {
                let url = self.link_url.take();
                self.restyle();
                if let Some(url) = url {
                    self.write_raw(DIM);
                    self.write(&format!(" ({})", url));
                    self.restyle();
                }
            }
            TagEnd::CodeBlock => {
                self.in_code_block = false;
                if !self.at_line_start {
                    self.newline();
                }
                self.write_raw(DIM);
                self.write("```");
                self.restyle();
                self.block_break();
            }
            TagEnd::BlockQuote(_) => {
                self.quote_depth = self.quote_depth.saturating_sub(1);
                self.block_break();
            }
            TagEnd::TableHead => {
                self.bold = self.bold.saturating_sub(1);
                self.restyle();
                self.newline();
            }
            TagEnd::TableRow => self.newline(),
            TagEnd::Table => self.block_break(),
            TagEnd::List(_) => {
                self.lists.pop();
                if self.lists.is_empty() {
                    self.block_break();
                }
            }
            _ => {}
        }
    }

    fn restyle(&mut self) {
        self.out.push_str(RESET);
        if self.bold > 0 || self.heading {
            self.out.push_str(BOLD);
        }
        if self.italic > 0 {
            self.out.push_str(ITALIC);
        }
        if self.strike > 0 {
            self.out.push_str(STRIKE);
        }
        if self.link_url.is_some() {
            self.out.push_str(UNDERLINE);
        }
    }

    fn code_text(&mut self, text: &str) {
        for line in text.split_inclusive('\n') {
            self.write_raw(CYAN);
            self.write("  ");
            self.write(line.trim_end_matches('\n'));
            self.restyle();
            if line.ends_with('\n') {
                self.newline();
            }
        }
    }

    fn write_raw(&mut self, codes: &str) {
        self.out.push_str(codes);
    }

    fn write(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        let mut lines = text.split('\n').peekable();
        while let Some(line) = lines.next() {
            if !line.is_empty() {
                if self.at_line_start {
                    self.out.push_str(&"│ ".repeat(self.quote_depth));
                    self.at_line_start = false;
                }
                self.out.push_str(line);
            }
            if lines.peek().is_some() {
                self.newline();
            }
        }
    }

    fn newline(&mut self) {
        self.out.push('\n');
        self.at_line_start = true;
    }

    /// End the current block, leaving one blank line before the next.
    fn block_break(&mut self) {
        if self.out.is_empty() {
            self.at_line_start = true;
            return;
        }
        if !self.at_line_start {
            self.newline();
        }
        if !self.out.ends_with("\n\n") {
            self.newline();
        }
    }

    fn finish(mut self) -> String {
        while self.out.ends_with('\n') {
            self.out.pop();
        }
        if self.out.contains('\x1b') {
            self.out.push_str(RESET);
        }
        self.out
    }
}

fn heading_level(level: HeadingLevel) -> usize {
    match level {
        HeadingLevel::H1 => 1,
        HeadingLevel::H2 => 2,
        HeadingLevel::H3 => 3,
        HeadingLevel::H4 => 4,
        HeadingLevel::H5 => 5,
        HeadingLevel::H6 => 6,
    }
}

/// Drop ANSI escape sequences, leaving the visible text.
#[cfg(test)]
pub(crate) fn strip_ansi(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c == '\x1b' {
            for next in chars.by_ref() {
                if next.is_ascii_alphabetic() {
                    break;
                }
            }
        } else {
            out.push(c);
        }
    }
    out
}
