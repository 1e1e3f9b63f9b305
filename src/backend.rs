use anyhow::*;
use log::*;
use serde_json::Value as Json;

use crate::{cse, expr::Expression, value::Value};

/// An execution engine for textual value IR.
pub trait Backend {
    /// Run `ir` and return its result, JSON-encoded as for `Literal`
    /// nodes.
    fn execute(&self, ir: &str) -> Result<Json>;
}

/// Compute the value of a constant expression on `backend`.
pub fn eval<B: Backend + ?Sized>(expr: &Expression, backend: &B) -> Result<Value> {
    if let Some(source) = expr.indices().source.as_ref() {
        bail!(
            "cannot evaluate an expression depending on '{}'; aggregate it first",
            source.name()
        )
    }
    if !expr.aggregations().is_empty() {
        bail!("cannot evaluate an expression with pending aggregations outside of an aggregation")
    }
    let ir = cse::render(expr.ir());
    debug!("evaluating {}", ir);
    let result = backend.execute(&ir)?;
    Value::from_json(&result, expr.dtype())
        .with_context(|| anyhow!("while decoding the result of {} as {}", ir, expr.dtype()))
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use serde_json::json;

    use super::*;
    use crate::{
        expr::{to_expr, Aggregators, SourceRef},
        types::Type,
    };

    /// Records the IR it is given and answers with a canned result.
    struct Canned {
        seen: RefCell<Vec<String>>,
        answer: Option<Json>,
    }
    impl Backend for Canned {
        fn execute(&self, ir: &str) -> Result<Json> {
            self.seen.borrow_mut().push(ir.to_owned());
            self.answer.clone().ok_or_else(|| anyhow!("backend is down"))
        }
    }
    fn canned(answer: Option<Json>) -> Canned {
        Canned {
            seen: RefCell::new(vec![]),
            answer,
        }
    }

    #[test]
    fn evaluates_constants() -> Result<()> {
        let x = to_expr(3, None)?;
        let y = x.add(&x)?;
        let backend = canned(Some(json!(6)));
        assert_eq!(eval(&y, &backend)?, Value::from(6));
        assert_eq!(
            backend.seen.borrow().as_slice(),
            ["(Let __cse_1 (I32 3) (ApplyBinaryPrimOp `+` (Ref __cse_1) (Ref __cse_1)))"]
        );
        Ok(())
    }

    #[test]
    fn decodes_by_type() -> Result<()> {
        let q = to_expr(7, None)?.div(2)?;
        assert_eq!(q.dtype(), &Type::Float32);
        let backend = canned(Some(json!(3.5)));
        assert_eq!(eval(&q, &backend)?, Value::Float(3.5));
        Ok(())
    }

    #[test]
    fn rejects_non_constants() -> Result<()> {
        let t = SourceRef::range_table("t", 10, None);
        let backend = canned(Some(json!(0)));
        assert!(eval(&t.row("idx")?, &backend).is_err());
        assert!(eval(&Aggregators::AGG.count()?, &backend).is_err());
        assert!(backend.seen.borrow().is_empty());
        Ok(())
    }

    #[test]
    fn backend_errors_propagate() -> Result<()> {
        let backend = canned(None);
        let e = eval(&to_expr(1, None)?, &backend).unwrap_err();
        assert_eq!(e.to_string(), "backend is down");
        Ok(())
    }
}
