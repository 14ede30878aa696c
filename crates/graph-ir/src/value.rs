// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Value definitions: element types, container kinds, and shapes.
//!
//! Shapes may carry symbolic dimensions (`"batch"`, `"seq"`). Two symbolic
//! dimensions compare equal only when they carry the same non-empty label,
//! so the planner's size checks stay conservative on unknown shapes.

use std::fmt;

/// Element type of a tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElemType {
    F32,
    F16,
    BF16,
    I8,
    U8,
    I32,
    I64,
    Bool,
    /// Variable-length strings; never eligible for buffer reuse.
    Str,
}

impl ElemType {
    /// Byte width of one element, or `None` for strings.
    pub fn byte_width(&self) -> Option<usize> {
        match self {
            ElemType::F32 | ElemType::I32 => Some(4),
            ElemType::F16 | ElemType::BF16 => Some(2),
            ElemType::I8 | ElemType::U8 | ElemType::Bool => Some(1),
            ElemType::I64 => Some(8),
            ElemType::Str => None,
        }
    }

    /// Returns `true` for string-typed tensors.
    pub fn is_string(&self) -> bool {
        matches!(self, ElemType::Str)
    }
}

/// Container kind of a value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueKind {
    /// A plain dense tensor.
    #[default]
    Tensor,
    /// A sequence of tensors.
    Sequence,
    /// A keyed map.
    Map,
    /// An optional value whose None-ness is only known at run time.
    Optional,
}

impl ValueKind {
    /// Returns `true` for plain tensors.
    pub fn is_tensor(&self) -> bool {
        matches!(self, ValueKind::Tensor)
    }
}

/// Element type + container kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ValueType {
    pub elem: ElemType,
    #[serde(default)]
    pub kind: ValueKind,
}

impl ValueType {
    /// A plain tensor of the given element type.
    pub fn tensor(elem: ElemType) -> Self {
        Self {
            elem,
            kind: ValueKind::Tensor,
        }
    }
}

/// One dimension of a shape: a fixed extent or a symbolic label.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum Dim {
    Fixed(u64),
    Sym(String),
}

impl Dim {
    /// The fixed extent, if known.
    pub fn value(&self) -> Option<u64> {
        match self {
            Dim::Fixed(v) => Some(*v),
            Dim::Sym(_) => None,
        }
    }

    /// Two dims denote the same extent: equal fixed values, or the same
    /// non-empty symbol.
    pub fn same_extent(&self, other: &Dim) -> bool {
        match (self, other) {
            (Dim::Fixed(a), Dim::Fixed(b)) => a == b,
            (Dim::Sym(a), Dim::Sym(b)) => !a.is_empty() && a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Dim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dim::Fixed(v) => write!(f, "{v}"),
            Dim::Sym(s) => write!(f, "{s}"),
        }
    }
}

/// A tensor shape, possibly with symbolic dimensions.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Shape(pub Vec<Dim>);

impl Shape {
    /// A fully static shape.
    pub fn fixed(dims: &[u64]) -> Self {
        Shape(dims.iter().map(|&d| Dim::Fixed(d)).collect())
    }

    /// Rank of the shape.
    pub fn rank(&self) -> usize {
        self.0.len()
    }

    /// The dimensions.
    pub fn dims(&self) -> &[Dim] {
        &self.0
    }

    /// Total element count, if every dimension is fixed.
    pub fn num_elements(&self) -> Option<u64> {
        self.0.iter().map(Dim::value).try_fold(1u64, |acc, d| {
            d.and_then(|d| acc.checked_mul(d))
        })
    }

    /// Returns `true` if every dimension denotes the same extent as the
    /// corresponding dimension of `other`.
    pub fn same_dims(&self, other: &Shape) -> bool {
        self.rank() == other.rank()
            && self
                .0
                .iter()
                .zip(other.0.iter())
                .all(|(a, b)| a.same_extent(b))
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, d) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "x")?;
            }
            write!(f, "{d}")?;
        }
        write!(f, "]")
    }
}

/// Definition site of one value: its name, type, and static shape.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ValueDef {
    /// Unique value name within the graph (and its outer scopes).
    pub name: String,
    /// Element type + container kind; `None` when type inference left the
    /// value untyped.
    pub ty: Option<ValueType>,
    /// Static shape, when known.
    pub shape: Option<Shape>,
}

impl ValueDef {
    /// A typed tensor value.
    pub fn tensor(name: impl Into<String>, elem: ElemType, shape: Shape) -> Self {
        Self {
            name: name.into(),
            ty: Some(ValueType::tensor(elem)),
            shape: Some(shape),
        }
    }

    /// An untyped placeholder.
    pub fn untyped(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ty: None,
            shape: None,
        }
    }

    /// Returns `true` for non-tensor containers (sequence, map, optional).
    pub fn is_non_tensor(&self) -> bool {
        self.ty.map_or(false, |t| !t.kind.is_tensor())
    }

    /// Returns `true` for optional-typed values.
    pub fn is_optional(&self) -> bool {
        self.ty.map_or(false, |t| matches!(t.kind, ValueKind::Optional))
    }

    /// Returns `true` for string-typed tensors.
    pub fn is_string(&self) -> bool {
        self.ty.map_or(false, |t| t.elem.is_string())
    }
}

/// Returns `true` when an argument slot is occupied.
///
/// Optional node arguments that were omitted appear as empty names; they
/// are skipped by every planning pass.
pub fn arg_exists(name: &str) -> bool {
    !name.is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_elem_byte_width() {
        assert_eq!(ElemType::F32.byte_width(), Some(4));
        assert_eq!(ElemType::F16.byte_width(), Some(2));
        assert_eq!(ElemType::I64.byte_width(), Some(8));
        assert_eq!(ElemType::Str.byte_width(), None);
    }

    #[test]
    fn test_num_elements() {
        assert_eq!(Shape::fixed(&[2, 3, 4]).num_elements(), Some(24));
        assert_eq!(Shape::fixed(&[]).num_elements(), Some(1));

        let symbolic = Shape(vec![Dim::Sym("batch".into()), Dim::Fixed(768)]);
        assert_eq!(symbolic.num_elements(), None);
    }

    #[test]
    fn test_same_dims_fixed() {
        assert!(Shape::fixed(&[2, 3]).same_dims(&Shape::fixed(&[2, 3])));
        assert!(!Shape::fixed(&[2, 3]).same_dims(&Shape::fixed(&[3, 2])));
        assert!(!Shape::fixed(&[2, 3]).same_dims(&Shape::fixed(&[2, 3, 1])));
    }

    #[test]
    fn test_same_dims_symbolic() {
        let a = Shape(vec![Dim::Sym("batch".into()), Dim::Fixed(8)]);
        let b = Shape(vec![Dim::Sym("batch".into()), Dim::Fixed(8)]);
        let c = Shape(vec![Dim::Sym("seq".into()), Dim::Fixed(8)]);
        assert!(a.same_dims(&b));
        assert!(!a.same_dims(&c));

        // Unnamed symbols never match, even against themselves.
        let anon = Shape(vec![Dim::Sym(String::new())]);
        assert!(!anon.same_dims(&anon.clone()));
    }

    #[test]
    fn test_value_def_kinds() {
        let t = ValueDef::tensor("x", ElemType::F32, Shape::fixed(&[4]));
        assert!(!t.is_non_tensor());
        assert!(!t.is_string());

        let mut opt = ValueDef::tensor("o", ElemType::F32, Shape::fixed(&[4]));
        opt.ty = Some(ValueType {
            elem: ElemType::F32,
            kind: ValueKind::Optional,
        });
        assert!(opt.is_non_tensor());
        assert!(opt.is_optional());

        let s = ValueDef::tensor("s", ElemType::Str, Shape::fixed(&[4]));
        assert!(s.is_string());
    }

    #[test]
    fn test_shape_display() {
        let s = Shape(vec![Dim::Sym("batch".into()), Dim::Fixed(768)]);
        assert_eq!(format!("{s}"), "[batchx768]");
    }

    #[test]
    fn test_arg_exists() {
        assert!(arg_exists("x"));
        assert!(!arg_exists(""));
    }
}
