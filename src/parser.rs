use std::fmt::{self, Display, Formatter};

use anyhow::*;
use itertools::Itertools;
use pest::{iterators::Pair, Parser};
use pest_derive::Parser;

use crate::utils::{escape_str, unescape, unescape_id};

#[derive(Parser)]
#[grammar = "ir.pest"]
pub(crate) struct IrParser;

/// A raw S-expression, before it is given any meaning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sexp {
    Atom(String),
    Str(String),
    List(Vec<Sexp>),
}
impl Sexp {
    pub fn atom(&self) -> Result<&str> {
        match self {
            Sexp::Atom(a) => Ok(a),
            _ => bail!("expected an atom, found `{}`", self),
        }
    }
    /// An atom read as a name, back-quotes removed.
    pub fn ident(&self) -> Result<String> {
        unescape_id(self.atom()?)
    }
    pub fn string(&self) -> Result<&str> {
        match self {
            Sexp::Str(s) => Ok(s),
            _ => bail!("expected a string, found `{}`", self),
        }
    }
    pub fn list(&self) -> Result<&[Sexp]> {
        match self {
            Sexp::List(xs) => Ok(xs),
            _ => bail!("expected a list, found `{}`", self),
        }
    }
    pub fn boolean(&self) -> Result<bool> {
        match self.atom()? {
            "True" | "true" => Ok(true),
            "False" | "false" => Ok(false),
            x => bail!("expected a boolean, found `{}`", x),
        }
    }
    pub fn is_none(&self) -> bool {
        matches!(self, Sexp::Atom(a) if a == "None")
    }
    pub fn parse_atom<T: std::str::FromStr>(&self) -> Result<T>
    where
        T::Err: std::error::Error + Send + Sync + 'static,
    {
        let a = self.atom()?;
        a.parse::<T>()
            .with_context(|| anyhow!("while reading `{}`", a))
    }
}
impl Display for Sexp {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Sexp::Atom(a) => write!(f, "{}", a),
            Sexp::Str(s) => write!(f, "{}", escape_str(s)),
            Sexp::List(xs) => write!(f, "({})", xs.iter().join(" ")),
        }
    }
}

fn build_sexp(pair: Pair<Rule>) -> Result<Sexp> {
    match pair.as_rule() {
        Rule::sexpr => Ok(Sexp::List(
            pair.into_inner().map(build_sexp).collect::<Result<Vec<_>>>()?,
        )),
        Rule::string => {
            let inner = pair.into_inner().next().map(|p| p.as_str()).unwrap_or("");
            Ok(Sexp::Str(unescape(inner)?))
        }
        Rule::atom => Ok(Sexp::Atom(pair.as_str().to_owned())),
        x => unreachable!("{:?}", x),
    }
}

/// Read every top-level S-expression in `source`.
pub fn parse_sexps(source: &str) -> Result<Vec<Sexp>> {
    IrParser::parse(Rule::sexprs, source)
        .map_err(|e| anyhow!("{}", e))?
        .filter(|p| p.as_rule() != Rule::EOI)
        .map(build_sexp)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_nested_lists() -> Result<()> {
        let xs = parse_sexps(
            r#"(ApplyBinaryPrimOp `+` (I32 5) (Str "a \"b\"")) (Literal Locus(GRCh37) "{}")"#,
        )?;
        assert_eq!(xs.len(), 2);
        let head = xs[0].list()?;
        assert_eq!(head[0].atom()?, "ApplyBinaryPrimOp");
        assert_eq!(head[1].ident()?, "+");
        assert_eq!(head[3].list()?[1].string()?, "a \"b\"");
        assert_eq!(xs[1].list()?[1].atom()?, "Locus(GRCh37)");
        Ok(())
    }

    #[test]
    fn rejects_unbalanced() {
        assert!(parse_sexps("(I32 5").is_err());
    }
}
