use std::fmt::Write as _;

use super::{GenFunction, TransFunction};
use crate::codec::{format_number, transform as transform_codec};
use crate::model::Transform3D;
use crate::{Error, Result};

/// Textual form of a transform function.
///
/// Fails with `Error::Expression` for closure-backed (`Native`) functions,
/// which have no textual form.
pub fn persistify(f: &TransFunction) -> Result<String> {
    let mut out = String::new();
    write_trans(&mut out, f)?;
    Ok(out)
}

fn write_trans(out: &mut String, f: &TransFunction) -> Result<()> {
    match f {
        TransFunction::Pow(p, g) => {
            out.push_str("Pow(");
            out.push_str(p.name());
            out.push_str("(1),");
            write_gen(out, g);
            out.push(')');
        }
        TransFunction::Product(a, b) => {
            out.push_str("Product(");
            write_trans(out, a)?;
            out.push(',');
            write_trans(out, b)?;
            out.push(')');
        }
        TransFunction::PreMult(t, g) => {
            out.push_str("PreMult(");
            write_matrix(out, t);
            out.push(',');
            write_trans(out, g)?;
            out.push(')');
        }
        TransFunction::PostMult(g, t) => {
            out.push_str("PostMult(");
            write_trans(out, g)?;
            out.push(',');
            write_matrix(out, t);
            out.push(')');
        }
        TransFunction::Native(n) => {
            return Err(Error::Expression(format!(
                "native function '{}' has no persistent form",
                n.name
            )));
        }
    }
    Ok(())
}

fn write_gen(out: &mut String, g: &GenFunction) {
    let (name, args): (&str, [Option<&GenFunction>; 2]) = match g {
        GenFunction::X => {
            out.push('X');
            return;
        }
        GenFunction::Const(v) => {
            let _ = write!(out, "Const({})", format_number(*v));
            return;
        }
        GenFunction::Sum(a, b) => ("Sum", [Some(a), Some(b)]),
        GenFunction::Diff(a, b) => ("Diff", [Some(a), Some(b)]),
        GenFunction::Prod(a, b) => ("Prod", [Some(a), Some(b)]),
        GenFunction::Quot(a, b) => ("Quot", [Some(a), Some(b)]),
        GenFunction::Neg(a) => ("Neg", [Some(a), None]),
        GenFunction::Sin(a) => ("Sin", [Some(a), None]),
        GenFunction::Cos(a) => ("Cos", [Some(a), None]),
        GenFunction::Sqrt(a) => ("Sqrt", [Some(a), None]),
    };
    out.push_str(name);
    out.push('(');
    for (i, arg) in args.into_iter().flatten().enumerate() {
        if i > 0 {
            out.push(',');
        }
        write_gen(out, arg);
    }
    out.push(')');
}

fn write_matrix(out: &mut String, t: &Transform3D) {
    out.push_str("Transform(");
    for (i, c) in transform_codec::encode(t).iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&format_number(*c));
    }
    out.push(')');
}
