/// Address of one statement inside nested block bodies.
///
/// Segments alternate: statement index, child body, statement index,
/// ... ending on a statement index. `[3, 1, 0]` is the first statement
/// of the second body (the ELSE branch, say) of statement 3.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct StatementPath(Vec<usize>);

impl StatementPath {
    pub fn new(segments: Vec<usize>) -> StatementPath {
        StatementPath(segments)
    }

    pub fn root(index: usize) -> StatementPath {
        StatementPath(vec![index])
    }

    pub fn segments(&self) -> &[usize] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Nesting depth: zero for a statement of the routine root.
    pub fn depth(&self) -> usize {
        self.0.len().saturating_sub(1) / 2
    }

    /// The path of `index` inside child body `body` of this statement.
    pub fn child(&self, body: usize, index: usize) -> StatementPath {
        let mut v = self.0.clone();
        v.push(body);
        v.push(index);
        StatementPath(v)
    }

    /// The statement that follows this one in the same body.
    pub fn next_sibling(&self) -> StatementPath {
        let mut v = self.0.clone();
        if let Some(last) = v.last_mut() {
            *last += 1;
        }
        StatementPath(v)
    }
}

impl std::fmt::Display for StatementPath {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let s: Vec<String> = self.0.iter().map(|n| n.to_string()).collect();
        write!(f, "[{}]", s.join("."))
    }
}

/// Where control lands relative to a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Landing {
    At,
    After,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub path: StatementPath,
    pub landing: Landing,
}

impl Target {
    pub fn at(path: StatementPath) -> Target {
        Target {
            path,
            landing: Landing::At,
        }
    }

    pub fn after(path: StatementPath) -> Target {
        Target {
            path,
            landing: Landing::After,
        }
    }

    /// Normalize `After` into the `At` of the following sibling.
    pub fn resolved(&self) -> StatementPath {
        match self.landing {
            Landing::At => self.path.clone(),
            Landing::After => self.path.next_sibling(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths() {
        let p = StatementPath::root(3);
        assert_eq!(p.depth(), 0);
        let c = p.child(1, 0);
        assert_eq!(c.segments(), &[3, 1, 0]);
        assert_eq!(c.depth(), 1);
        assert_eq!(Target::after(c.clone()).resolved().segments(), &[3, 1, 1]);
        assert_eq!(Target::at(c).resolved().to_string(), "[3.1.0]");
    }
}
