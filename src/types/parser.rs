use std::str::FromStr;

use anyhow::*;
use pest::{iterators::Pair, Parser};

use super::{Fields, ReferenceGenome, Type};
use crate::{
    parser::{IrParser, Rule},
    utils::unescape_id,
};

fn build_fields<'a>(pairs: impl Iterator<Item = Pair<'a, Rule>>) -> Result<Fields> {
    let mut fields = Vec::new();
    for field in pairs {
        let mut inner = field.into_inner();
        let name = inner.next().with_context(|| anyhow!("missing field name"))?;
        let name = unescape_id(name.as_str())?;
        let t = build_type(inner.next().with_context(|| anyhow!("missing field type"))?)?;
        if fields.iter().any(|(n, _)| *n == name) {
            bail!("duplicate field `{}`", name)
        }
        fields.push((name, t));
    }
    Ok(Fields::new(fields))
}

fn build_type(pair: Pair<Rule>) -> Result<Type> {
    let rule = pair.as_rule();
    let text = pair.as_str().to_owned();
    let mut inner = pair.into_inner();
    let mut next = || -> Result<Type> {
        build_type(
            inner
                .next()
                .with_context(|| anyhow!("incomplete type `{}`", text))?,
        )
    };

    Ok(match rule {
        Rule::d_scalar | Rule::i_scalar => match text.as_str() {
            "bool" | "Boolean" => Type::Bool,
            "int32" | "int" | "Int32" => Type::Int32,
            "int64" | "Int64" => Type::Int64,
            "float32" | "Float32" => Type::Float32,
            "float64" | "float" | "Float64" => Type::Float64,
            "str" | "String" => Type::Str,
            "call" | "Call" => Type::Call,
            "void" | "Void" => Type::Void,
            x => unreachable!("{}", x),
        },
        Rule::d_array | Rule::i_array => Type::array(next()?),
        Rule::d_set | Rule::i_set => Type::set(next()?),
        Rule::d_interval | Rule::i_interval => Type::interval(next()?),
        Rule::d_dict | Rule::i_dict => {
            let k = next()?;
            let v = next()?;
            Type::dict(k, v)
        }
        Rule::d_tuple | Rule::i_tuple => {
            Type::Tuple(inner.map(build_type).collect::<Result<Vec<_>>>()?)
        }
        Rule::d_struct | Rule::i_struct => Type::Struct(build_fields(inner)?),
        Rule::d_locus | Rule::i_locus => {
            let genome = inner.next().map(|p| p.as_str()).unwrap_or_default();
            Type::Locus(ReferenceGenome::from(genome))
        }
        Rule::d_ndarray | Rule::i_ndarray => {
            let t = next()?;
            let n = inner
                .next()
                .with_context(|| anyhow!("missing dimension in `{}`", text))?
                .as_str()
                .parse::<usize>()?;
            Type::ndarray(t, n)
        }
        x => unreachable!("{:?}", x),
    })
}

fn parse_with(rule: Rule, source: &str) -> Result<Type> {
    let pair = IrParser::parse(rule, source)
        .map_err(|e| anyhow!("{}", e))
        .with_context(|| anyhow!("while parsing type `{}`", source))?
        .next()
        .with_context(|| anyhow!("empty type"))?;
    build_type(pair)
}

impl Type {
    /// Parse the canonical IR form, as produced by
    /// [`Type::parsable_string`].
    pub fn parse_ir(source: &str) -> Result<Type> {
        parse_with(Rule::ir_type_eoi, source)
    }
}

impl FromStr for Type {
    type Err = anyhow::Error;

    /// Parse the user-facing form, as produced by `Display`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_with(Rule::dtype_eoi, s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_types() -> Result<()> {
        for s in [
            "int32",
            "array<set<str>>",
            "dict<str, tuple(int64, bool)>",
            "struct{a: float64, `weird name`: locus<GRCh38>}",
            "interval<locus<GRCh37>>",
            "ndarray<float32, 3>",
            "struct{}",
            "tuple()",
        ] {
            let t: Type = s.parse()?;
            assert_eq!(t.to_string(), s);
            assert_eq!(Type::parse_ir(&t.parsable_string())?, t);
        }
        assert_eq!("int".parse::<Type>()?, Type::Int32);
        assert_eq!("float".parse::<Type>()?, Type::Float64);
        Ok(())
    }

    #[test]
    fn malformed() {
        assert!("array<int32".parse::<Type>().is_err());
        assert!("int33".parse::<Type>().is_err());
        assert!("struct{a: int32, a: str}".parse::<Type>().is_err());
        assert!(Type::parse_ir("Array[int32]").is_err());
    }
}
