use std::sync::Arc;

use super::{Expression, Indices};

/// A pending aggregation: the expressions it aggregates over, and where
/// they came from.
#[derive(Debug, Clone)]
pub struct Aggregation {
    pub exprs: Vec<Expression>,
    pub indices: Indices,
}

#[derive(Debug)]
struct Link {
    head: Arc<Aggregation>,
    tail: Option<Arc<Link>>,
    len: usize,
}

/// The ordered aggregations an expression depends on. The list is
/// persistent: extending it never copies the existing links.
#[derive(Debug, Clone, Default)]
pub struct Aggregations(Option<Arc<Link>>);

impl Aggregations {
    pub fn len(&self) -> usize {
        self.0.as_ref().map(|l| l.len).unwrap_or(0)
    }
    pub fn is_empty(&self) -> bool {
        self.0.is_none()
    }

    fn push_shared(&self, head: Arc<Aggregation>) -> Aggregations {
        Aggregations(Some(Arc::new(Link {
            head,
            tail: self.0.clone(),
            len: self.len() + 1,
        })))
    }

    pub fn push(&self, a: Aggregation) -> Aggregations {
        self.push_shared(Arc::new(a))
    }

    /// `self` followed by `other`.
    pub fn concat(&self, other: &Aggregations) -> Aggregations {
        if self.is_empty() {
            return other.clone();
        }
        let mut links = Vec::with_capacity(other.len());
        let mut cursor = other.0.as_ref();
        while let Some(l) = cursor {
            links.push(l.head.clone());
            cursor = l.tail.as_ref();
        }
        links
            .into_iter()
            .rev()
            .fold(self.clone(), |acc, a| acc.push_shared(a))
    }

    /// The aggregations, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &Aggregation> {
        let mut r = Vec::with_capacity(self.len());
        let mut cursor = self.0.as_ref();
        while let Some(l) = cursor {
            r.push(l.head.as_ref());
            cursor = l.tail.as_ref();
        }
        r.into_iter().rev()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{expr::literal, value::Value};

    fn marker(i: i32) -> Aggregation {
        Aggregation {
            exprs: vec![literal(&Value::from(i), &crate::types::Type::Int32).unwrap()],
            indices: Indices::default(),
        }
    }
    fn ids(a: &Aggregations) -> Vec<String> {
        a.iter().map(|x| x.exprs[0].ir().to_string()).collect()
    }

    #[test]
    fn order_is_kept() {
        let a = Aggregations::default().push(marker(1)).push(marker(2));
        let b = Aggregations::default().push(marker(3));
        let c = a.concat(&b);
        assert_eq!(c.len(), 3);
        assert_eq!(ids(&c), vec!["(I32 1)", "(I32 2)", "(I32 3)"]);
        assert_eq!(ids(&b.concat(&a)), vec!["(I32 3)", "(I32 1)", "(I32 2)"]);
        // the operands are left untouched
        assert_eq!(ids(&a), vec!["(I32 1)", "(I32 2)"]);
        assert!(Aggregations::default().concat(&Aggregations::default()).is_empty());
    }
}
