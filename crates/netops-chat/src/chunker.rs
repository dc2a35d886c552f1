//! Outbound message chunker
//!
//! The relay space caps message length. Longer messages are packed line by
//! line into chunks of at most `max_len` characters; a single line longer
//! than the cap is split at character boundaries. Chunks after the first get
//! a `_(Part i/n)_` marker when it still fits under the cap.
//!
//! Chunk contents keep their line breaks, so concatenating every chunk's
//! `content` reproduces the original text exactly.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Slice of the original message
    pub content: String,
    /// Part marker prepended when sending
    pub marker: Option<String>,
}

impl Chunk {
    /// Text as it is posted
    pub fn render(&self) -> String {
        match &self.marker {
            Some(marker) => format!("{}{}", marker, self.content),
            None => self.content.clone(),
        }
    }

    /// Nothing but whitespace; such chunks are not posted
    pub fn is_blank(&self) -> bool {
        self.content.trim().is_empty()
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

pub fn part_marker(index: usize, total: usize) -> String {
    format!("_(Part {}/{})_\n\n", index, total)
}

/// Split `text` into chunks of at most `max_len` characters.
pub fn chunk_message(text: &str, max_len: usize) -> Vec<Chunk> {
    let max_len = max_len.max(1);
    if char_len(text) <= max_len {
        return vec![Chunk {
            content: text.to_string(),
            marker: None,
        }];
    }

    let mut pieces: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for line in text.split_inclusive('\n') {
        let line_len = char_len(line);

        if line_len > max_len {
            if !current.is_empty() {
                pieces.push(std::mem::take(&mut current));
                current_len = 0;
            }
            let chars: Vec<char> = line.chars().collect();
            let mut slices = chars.chunks(max_len).peekable();
            while let Some(slice) = slices.next() {
                let piece: String = slice.iter().collect();
                if slices.peek().is_some() {
                    pieces.push(piece);
                } else {
                    current_len = slice.len();
                    current = piece;
                }
            }
            continue;
        }

        if current_len + line_len > max_len {
            pieces.push(std::mem::take(&mut current));
            current_len = 0;
        }
        current.push_str(line);
        current_len += line_len;
    }

    if !current.is_empty() {
        pieces.push(current);
    }

    let total = pieces.len();
    pieces
        .into_iter()
        .enumerate()
        .map(|(i, content)| {
            let marker = if i == 0 {
                None
            } else {
                let marker = part_marker(i + 1, total);
                (char_len(&marker) + char_len(&content) <= max_len).then_some(marker)
            };
            Chunk { content, marker }
        })
        .collect()
}
