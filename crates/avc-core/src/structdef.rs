//! Struct descriptors, used by the global cross-reference check (X-Code pass
//! 8) to validate field references by bounds and kind.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Int,
    Ptr,
    Hybrid,
    Composite,
    AtomicInt,
    AtomicPtr,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructField {
    pub name: String,
    pub kind: FieldKind,
    pub offset: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StructDescriptor {
    pub name: String,
    pub fields: Vec<StructField>,
}

impl StructDescriptor {
    pub fn field(&self, name: &str) -> Option<&StructField> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn field_at(&self, index: usize) -> Option<&StructField> {
        self.fields.get(index)
    }

    pub fn field_kind_matches(&self, index: usize, expected: FieldKind) -> bool {
        self.field_at(index).is_some_and(|f| f.kind == expected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point() -> StructDescriptor {
        StructDescriptor {
            name: "Point".into(),
            fields: vec![
                StructField {
                    name: "x".into(),
                    kind: FieldKind::Int,
                    offset: 0,
                },
                StructField {
                    name: "y".into(),
                    kind: FieldKind::Int,
                    offset: 8,
                },
            ],
        }
    }

    #[test]
    fn looks_up_field_by_name() {
        assert_eq!(point().field("y").unwrap().offset, 8);
    }

    #[test]
    fn out_of_bounds_field_index_is_none() {
        assert!(point().field_at(5).is_none());
    }
}
