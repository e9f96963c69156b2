//! Middle-out truncation for log lines.
//!
//! Model responses can be long; logs keep the head and tail and note how
//! much was elided. Cuts always land on UTF-8 boundaries.

const APPROX_BYTES_PER_TOKEN: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TruncationPolicy {
    Bytes(usize),
    Tokens(usize),
}

impl TruncationPolicy {
    pub fn byte_budget(&self) -> usize {
        match self {
            TruncationPolicy::Bytes(b) => *b,
            TruncationPolicy::Tokens(t) => t.saturating_mul(APPROX_BYTES_PER_TOKEN),
        }
    }
}

fn floor_boundary(text: &str, index: usize) -> usize {
    let mut i = index.min(text.len());
    while !text.is_char_boundary(i) {
        i -= 1;
    }
    i
}

fn ceil_boundary(text: &str, index: usize) -> usize {
    let mut i = index.min(text.len());
    while !text.is_char_boundary(i) {
        i += 1;
    }
    i
}

/// Keep roughly half the budget from each end of `content`.
pub fn truncate_text(content: &str, policy: TruncationPolicy) -> String {
    let budget = policy.byte_budget();
    if content.len() <= budget {
        return content.to_string();
    }

    let half = budget / 2;
    let head_end = floor_boundary(content, half);
    let tail_start = ceil_boundary(content, content.len() - half).max(head_end);
    let elided = tail_start - head_end;

    format!("{} ...[{} bytes elided]... {}", &content[..head_end], elided, &content[tail_start..])
}
