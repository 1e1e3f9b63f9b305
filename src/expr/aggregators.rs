use super::{expr_as, to_expr, unify_all, Aggregation, Aggregations, Expression, Indices};
use crate::{
    errors::{ExprResult, ExpressionError, UnificationError},
    ir::{aggregator_type, Ir, IrKind},
    types::Type,
    value::Value,
};

/// Builders for aggregations over the records of a source, or for scans
/// when `is_scan` is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Aggregators {
    is_scan: bool,
}

impl Aggregators {
    pub const AGG: Aggregators = Aggregators { is_scan: false };
    pub const SCAN: Aggregators = Aggregators { is_scan: true };

    pub fn is_scan(&self) -> bool {
        self.is_scan
    }

    fn aggregate(&self, op: &str, ctor: Vec<Expression>, seq: Vec<Expression>) -> ExprResult<Expression> {
        if let Some(nested) = seq.iter().find(|e| !e.aggregations().is_empty()) {
            log::debug!("{} over {:?}", op, nested);
            return Err(UnificationError::NestedAggregation(op.to_owned()).into());
        }
        if let Some(source) = ctor.iter().find_map(|e| e.indices().source.as_ref()) {
            return Err(
                UnificationError::NonConstantArgument(op.to_owned(), source.name().to_owned()).into(),
            );
        }

        let ctor_types = ctor.iter().map(|e| e.dtype().clone()).collect::<Vec<_>>();
        let seq_types = seq.iter().map(|e| e.dtype().clone()).collect::<Vec<_>>();
        let t = aggregator_type(op, &ctor_types, &seq_types)?;

        let (indices, _) = unify_all(seq.iter())?;
        let ctor = ctor.iter().map(|e| e.ir().clone()).collect();
        let args = seq.iter().map(|e| e.ir().clone()).collect();
        let ir = if self.is_scan {
            Ir::apply_scan_op(op, ctor, None, args)
        } else {
            Ir::apply_agg_op(op, ctor, None, args)
        };
        let aggregations = Aggregations::default().push(Aggregation {
            exprs: seq,
            indices: indices.clone(),
        });
        let result_indices = if self.is_scan {
            indices
        } else {
            Indices::new(indices.source, [])
        };
        Ok(Expression::new(ir, t, result_indices, aggregations))
    }

    fn constant(&self, op: &str, v: impl Into<Value>, t: &Type) -> ExprResult<Expression> {
        let e = to_expr(v, Some(t))?;
        if let Some(source) = e.indices().source.as_ref() {
            return Err(
                UnificationError::NonConstantArgument(op.to_owned(), source.name().to_owned()).into(),
            );
        }
        Ok(e)
    }

    pub fn count(&self) -> ExprResult<Expression> {
        self.aggregate("Count", vec![], vec![])
    }

    fn summed(&self, op: &str, e: &Expression) -> ExprResult<Expression> {
        let t = match e.dtype() {
            t if t.is_integral() || t.is_bool() => Type::Int64,
            t if t.is_numeric() => Type::Float64,
            t => {
                return Err(ExpressionError::WrongReceiver {
                    method: op.to_lowercase(),
                    expected: "a numeric expression",
                    found: t.clone(),
                })
            }
        };
        let e = match e.dtype() {
            Type::Bool => expr_as(e, &t)?,
            _ => e.cast(&t)?,
        };
        self.aggregate(op, vec![], vec![e])
    }
    /// The sum as an `int64` or a `float64`.
    pub fn sum(&self, e: &Expression) -> ExprResult<Expression> {
        self.summed("Sum", e)
    }
    pub fn product(&self, e: &Expression) -> ExprResult<Expression> {
        self.summed("Product", e)
    }

    pub fn min(&self, e: &Expression) -> ExprResult<Expression> {
        self.aggregate("Min", vec![], vec![e.clone()])
    }
    pub fn max(&self, e: &Expression) -> ExprResult<Expression> {
        self.aggregate("Max", vec![], vec![e.clone()])
    }
    pub fn collect(&self, e: &Expression) -> ExprResult<Expression> {
        self.aggregate("Collect", vec![], vec![e.clone()])
    }
    pub fn collect_as_set(&self, e: &Expression) -> ExprResult<Expression> {
        self.aggregate("CollectAsSet", vec![], vec![e.clone()])
    }
    /// The first `n` values met.
    pub fn take(&self, e: &Expression, n: impl Into<Value>) -> ExprResult<Expression> {
        let n = self.constant("Take", n, &Type::Int32)?;
        self.aggregate("Take", vec![n], vec![e.clone()])
    }
    pub fn counter(&self, e: &Expression) -> ExprResult<Expression> {
        self.aggregate("Counter", vec![], vec![e.clone()])
    }
    pub fn fraction(&self, predicate: &Expression) -> ExprResult<Expression> {
        self.aggregate("Fraction", vec![], vec![predicate.clone()])
    }
    /// Mean, standard deviation, extrema, count and sum of a numeric
    /// expression.
    pub fn stats(&self, e: &Expression) -> ExprResult<Expression> {
        let e = e.cast(&Type::Float64)?;
        self.aggregate("Statistics", vec![], vec![e])
    }
    pub fn call_stats(&self, call: &Expression) -> ExprResult<Expression> {
        self.aggregate("CallStats", vec![], vec![call.clone()])
    }

    /// Restrict the records seen by `aggregated` to those satisfying
    /// `condition`.
    pub fn filter(&self, condition: impl Into<Value>, aggregated: &Expression) -> ExprResult<Expression> {
        let condition = to_expr(condition, Some(&Type::Bool))?;
        if !condition.aggregations().is_empty() {
            return Err(UnificationError::NestedAggregation("filter".into()).into());
        }
        let (indices, _) = unify_all([&condition, aggregated])?;
        let aggregations = aggregated.aggregations().push(Aggregation {
            exprs: vec![condition.clone()],
            indices: indices.clone(),
        });
        let result_indices = if self.is_scan {
            indices
        } else {
            Indices::new(indices.source, [])
        };
        Ok(Expression::new(
            Ir::new(
                IrKind::AggFilter {
                    is_scan: self.is_scan,
                },
                vec![condition.ir().clone(), aggregated.ir().clone()],
            ),
            aggregated.dtype().clone(),
            result_indices,
            aggregations,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        expr::{literal, SourceRef},
        ir::TypeEnv,
    };

    fn row_env() -> TypeEnv {
        TypeEnv::new().with_aggregation([("row", Type::tstruct([("idx", Type::Int32)]))])
    }

    #[test]
    fn sum_over_rows() -> ExprResult<()> {
        let t = SourceRef::range_table("t", 10, None);
        let s = Aggregators::AGG.sum(&t.row("idx")?)?;
        assert_eq!(s.dtype(), &Type::Int64);
        assert_eq!(s.indices().to_string(), "t (global)");
        assert_eq!(s.aggregations().len(), 1);
        assert_eq!(
            s.ir().to_string(),
            "(ApplyAggOp Sum () None ((Cast Int64 (GetField idx (Ref row)))))"
        );
        assert_eq!(s.ir().infer_type(&row_env()), Ok(Type::Int64));

        let total = t.aggregate(&s)?;
        assert!(total.indices().is_constant());
        assert_eq!(
            total.ir().to_string(),
            "(TableAggregate (TableRange 10 None) \
             (ApplyAggOp Sum () None ((Cast Int64 (GetField idx (Ref row))))))"
        );
        Ok(())
    }

    #[test]
    fn scans_keep_their_axes() -> ExprResult<()> {
        let t = SourceRef::range_table("t", 10, None);
        let s = Aggregators::SCAN.collect(&t.row("idx")?)?;
        assert_eq!(s.dtype(), &Type::array(Type::Int32));
        assert_eq!(s.indices().to_string(), "t (row)");
        assert!(s.ir().to_string().starts_with("(ApplyScanOp Collect"));
        Ok(())
    }

    #[test]
    fn nesting_is_rejected() -> ExprResult<()> {
        let t = SourceRef::range_table("t", 10, None);
        let c = Aggregators::AGG.count()?;
        assert!(matches!(
            Aggregators::AGG.sum(&c),
            Err(ExpressionError::Unification(UnificationError::NestedAggregation(_)))
        ));
        assert!(matches!(
            Aggregators::AGG.take(&t.row("idx")?, t.row("idx")?),
            Err(ExpressionError::Unification(UnificationError::NonConstantArgument(..)))
        ));
        Ok(())
    }

    #[test]
    fn result_types() -> ExprResult<()> {
        let t = SourceRef::range_table("t", 10, None);
        let idx = t.row("idx")?;
        let agg = Aggregators::AGG;
        assert_eq!(agg.take(&idx, 3)?.dtype(), &Type::array(Type::Int32));
        assert_eq!(agg.counter(&idx)?.dtype(), &Type::dict(Type::Int32, Type::Int64));
        assert_eq!(agg.fraction(&idx.gt(3)?)?.dtype(), &Type::Float64);
        assert_eq!(agg.stats(&idx)?.dtype().fields().map(|f| f.len()), Some(6));
        assert_eq!(agg.max(&idx)?.dtype(), &Type::Int32);
        assert!(agg.sum(&literal(&"a".into(), &Type::Str)?).is_err());

        let even = idx.rem(2)?.equals(0)?;
        let filtered = agg.filter(&even, &agg.count()?)?;
        assert_eq!(filtered.dtype(), &Type::Int64);
        assert_eq!(filtered.aggregations().len(), 2);
        assert_eq!(filtered.ir().infer_type(&row_env()), Ok(Type::Int64));
        Ok(())
    }
}
