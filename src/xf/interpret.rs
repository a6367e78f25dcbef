//! Recursive descent interpreter for the textual function form.

use super::{GenFunction, Primitive, TransFunction};
use crate::codec::transform as transform_codec;
use crate::model::Transform3D;
use crate::{Error, Result};

/// Parser state: the source text and a byte cursor.
struct Parser<'s> {
    src: &'s str,
    pos: usize,
}

impl<'s> Parser<'s> {
    fn new(src: &'s str) -> Self {
        Self { src, pos: 0 }
    }

    fn skip_ws(&mut self) {
        while let Some(c) = self.rest().chars().next() {
            if !c.is_whitespace() {
                break;
            }
            self.pos += c.len_utf8();
        }
    }

    fn rest(&self) -> &'s str {
        &self.src[self.pos..]
    }

    fn peek(&mut self) -> Option<char> {
        self.skip_ws();
        self.rest().chars().next()
    }

    fn eat(&mut self, ch: char) -> bool {
        if self.peek() == Some(ch) {
            self.pos += ch.len_utf8();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, ch: char) -> Result<()> {
        if self.eat(ch) {
            Ok(())
        } else {
            Err(self.error(format!("expected '{ch}'")))
        }
    }

    fn ident(&mut self) -> Result<&'s str> {
        self.skip_ws();
        let rest = self.rest();
        let len = rest
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or(rest.len());
        if len == 0 {
            return Err(self.error("expected a name".into()));
        }
        self.pos += len;
        Ok(&rest[..len])
    }

    /// A number runs up to the next `,` or `)`.
    fn number(&mut self) -> Result<f64> {
        self.skip_ws();
        let rest = self.rest();
        let len = rest.find([',', ')']).unwrap_or(rest.len());
        let text = rest[..len].trim();
        let value = text
            .parse::<f64>()
            .map_err(|_| self.error(format!("invalid number '{text}'")))?;
        self.pos += len;
        Ok(value)
    }

    fn at_end(&mut self) -> bool {
        self.peek().is_none()
    }

    fn error(&self, msg: String) -> Error {
        Error::Expression(format!("{msg} at offset {} in '{}'", self.pos, self.src))
    }
}

/// Parse the textual form written by [`persistify`](super::persistify).
///
/// Empty (or all-whitespace) input is `Error::EmptyFunction`; anything that
/// does not parse completely is `Error::Expression`.
pub fn interpret(text: &str) -> Result<TransFunction> {
    if text.trim().is_empty() {
        return Err(Error::EmptyFunction);
    }
    let mut p = Parser::new(text);
    let f = parse_trans(&mut p)?;
    if !p.at_end() {
        return Err(p.error("trailing input".into()));
    }
    Ok(f)
}

fn parse_trans(p: &mut Parser) -> Result<TransFunction> {
    let name = p.ident()?;
    p.expect('(')?;
    let f = match name {
        "Pow" => {
            let prim = parse_primitive(p)?;
            p.expect(',')?;
            TransFunction::Pow(prim, parse_gen(p)?)
        }
        "Product" => {
            let a = parse_trans(p)?;
            p.expect(',')?;
            let b = parse_trans(p)?;
            TransFunction::Product(Box::new(a), Box::new(b))
        }
        "PreMult" => {
            let t = parse_matrix(p)?;
            p.expect(',')?;
            TransFunction::PreMult(t, Box::new(parse_trans(p)?))
        }
        "PostMult" => {
            let f = parse_trans(p)?;
            p.expect(',')?;
            TransFunction::PostMult(Box::new(f), parse_matrix(p)?)
        }
        other => return Err(p.error(format!("unknown transform function '{other}'"))),
    };
    p.expect(')')?;
    Ok(f)
}

fn parse_primitive(p: &mut Parser) -> Result<Primitive> {
    let name = p.ident()?;
    let prim = Primitive::from_name(name)
        .ok_or_else(|| p.error(format!("unknown primitive '{name}'")))?;
    p.expect('(')?;
    let unit = p.number()?;
    if unit != 1.0 {
        return Err(p.error(format!("primitive {name} takes a unit argument, got {unit}")));
    }
    p.expect(')')?;
    Ok(prim)
}

fn parse_matrix(p: &mut Parser) -> Result<Transform3D> {
    let name = p.ident()?;
    if name != "Transform" {
        return Err(p.error(format!("expected Transform, got '{name}'")));
    }
    p.expect('(')?;
    let mut coeffs = Vec::with_capacity(12);
    loop {
        coeffs.push(p.number()?);
        if !p.eat(',') {
            break;
        }
    }
    p.expect(')')?;
    transform_codec::decode(&coeffs).map_err(|e| p.error(e.to_string()))
}

fn parse_gen(p: &mut Parser) -> Result<GenFunction> {
    let name = p.ident()?;
    if name == "X" {
        return Ok(GenFunction::X);
    }
    p.expect('(')?;
    let g = match name {
        "Const" => GenFunction::Const(p.number()?),
        "Sum" | "Diff" | "Prod" | "Quot" => {
            let a = Box::new(parse_gen(p)?);
            p.expect(',')?;
            let b = Box::new(parse_gen(p)?);
            match name {
                "Sum" => GenFunction::Sum(a, b),
                "Diff" => GenFunction::Diff(a, b),
                "Prod" => GenFunction::Prod(a, b),
                _ => GenFunction::Quot(a, b),
            }
        }
        "Neg" => GenFunction::Neg(Box::new(parse_gen(p)?)),
        "Sin" => GenFunction::Sin(Box::new(parse_gen(p)?)),
        "Cos" => GenFunction::Cos(Box::new(parse_gen(p)?)),
        "Sqrt" => GenFunction::Sqrt(Box::new(parse_gen(p)?)),
        other => return Err(p.error(format!("unknown function '{other}'"))),
    };
    p.expect(')')?;
    Ok(g)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xf::persistify;

    #[test]
    fn test_parse_linear_translation() {
        let f = interpret("Pow(TranslateZ3D(1),Sum(Const(-150),Prod(Const(100),X)))").unwrap();
        assert_eq!(f.eval(2.0).translation_vector(), [0.0, 0.0, 50.0]);
    }

    #[test]
    fn test_whitespace_is_tolerated() {
        let f = interpret(" Pow( RotateZ3D(1) , Neg(X) ) ").unwrap();
        assert_eq!(f, TransFunction::pow(Primitive::RotateZ3D, -GenFunction::x()));
    }

    #[test]
    fn test_round_trip_through_text() {
        let f = TransFunction::PostMult(
            Box::new(
                TransFunction::pow(Primitive::TranslateX3D, GenFunction::x().cos())
                    * TransFunction::pow(Primitive::RotateY3D, GenFunction::x() / GenFunction::constant(3.0)),
            ),
            Transform3D::rotation_x(0.25) * Transform3D::translation(1.5, -2.0, 1e-9),
        );
        let text = persistify(&f).unwrap();
        let back = interpret(&text).unwrap();
        assert_eq!(back, f);
        assert_eq!(persistify(&back).unwrap(), text);
    }

    #[test]
    fn test_empty_is_its_own_error() {
        assert!(matches!(interpret(""), Err(Error::EmptyFunction)));
        assert!(matches!(interpret("   "), Err(Error::EmptyFunction)));
    }

    #[test]
    fn test_garbage_is_rejected() {
        for bad in [
            "Pow(TranslateZ3D(1),X",
            "Pow(Scale3D(1),X)",
            "Pow(TranslateZ3D(2),X)",
            "Pow(TranslateZ3D(1),X) extra",
            "PreMult(Transform(1,0,0),Pow(TranslateZ3D(1),X))",
            "Const(3)",
        ] {
            assert!(matches!(interpret(bad), Err(Error::Expression(_))), "accepted {bad}");
        }
    }
}
