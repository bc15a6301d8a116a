//! Bounded chat history.

use std::collections::VecDeque;

/// Number of broadcast lines kept by default.
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

/// FIFO of the most recent broadcast chat lines.
///
/// Only plain chat lines are recorded; SYSTEM notices never enter the
/// history.
#[derive(Debug, Clone)]
pub struct ChatHistory {
    lines: VecDeque<String>,
    limit: usize,
}

impl ChatHistory {
    pub fn new(limit: usize) -> Self {
        Self {
            lines: VecDeque::with_capacity(limit.min(1024)),
            limit,
        }
    }

    /// Appends a line, returning the evicted oldest line if the limit was exceeded.
    pub fn push(&mut self, line: impl Into<String>) -> Option<String> {
        self.lines.push_back(line.into());
        if self.lines.len() > self.limit {
            self.lines.pop_front()
        } else {
            None
        }
    }

    /// The last `n` lines, oldest first.
    pub fn recent(&self, n: usize) -> Vec<String> {
        let skip = self.lines.len().saturating_sub(n);
        self.lines.iter().skip(skip).cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

impl Default for ChatHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LIMIT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keeps_most_recent_fifty_of_fifty_five() {
        let mut history = ChatHistory::default();
        for i in 0..55 {
            history.push(format!("Alice: message {i}"));
        }

        assert_eq!(history.len(), 50);
        assert_eq!(history.iter().next(), Some("Alice: message 5"));
        assert_eq!(history.iter().last(), Some("Alice: message 54"));
    }

    #[test]
    fn test_push_reports_eviction() {
        let mut history = ChatHistory::new(2);
        assert_eq!(history.push("a"), None);
        assert_eq!(history.push("b"), None);
        assert_eq!(history.push("c"), Some("a".to_string()));
    }

    #[test]
    fn test_recent_returns_tail_in_order() {
        let mut history = ChatHistory::new(10);
        for line in ["one", "two", "three"] {
            history.push(line);
        }
        assert_eq!(history.recent(2), vec!["two", "three"]);
        assert_eq!(history.recent(10).len(), 3);
    }

    #[test]
    fn test_zero_limit_keeps_nothing() {
        let mut history = ChatHistory::new(0);
        history.push("dropped");
        assert!(history.is_empty());
    }
}
