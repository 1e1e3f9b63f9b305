pub const DEFAULT_PREFIX: &str = "__uid_";

/// Hands out the names bound by lambdas. Each independent construction
/// owns one; names are unique within it.
#[derive(Debug, Clone)]
pub struct Uids {
    prefix: String,
    next: usize,
}
impl Default for Uids {
    fn default() -> Self {
        Uids::with_prefix(DEFAULT_PREFIX)
    }
}
impl Uids {
    pub fn new() -> Self {
        Default::default()
    }
    pub fn with_prefix(prefix: &str) -> Self {
        Uids {
            prefix: prefix.to_owned(),
            next: 1,
        }
    }
    pub fn fresh(&mut self) -> String {
        let r = format!("{}{}", self.prefix, self.next);
        self.next += 1;
        r
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_names() {
        let mut uids = Uids::new();
        assert_eq!(uids.fresh(), "__uid_1");
        assert_eq!(uids.fresh(), "__uid_2");
        assert_eq!(Uids::with_prefix("x").fresh(), "x1");
    }
}
