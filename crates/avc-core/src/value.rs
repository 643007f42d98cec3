//! Traits describing the opaque runtime value the compiler never constructs
//! itself: it only asks a collaborator to produce, convert, or compare one.

/// A dynamically-typed runtime datum.
///
/// The compiler only ever touches values handed back by a collaborator
/// (constant-folding results, literal conversions at well-defined try-points);
/// it never inspects or owns their representation.
pub trait RuntimeValue: Clone + std::fmt::Debug {
    type List: RuntimeList<Self>;
    type Map: RuntimeMap<Self>;

    fn to_string_value(&self) -> String;
    fn of_string(s: &str) -> Self;
    fn of_integer(i: i64) -> Self;
    fn of_function(name: &str) -> Self;

    fn value_hash(&self) -> u64;
    fn value_eq(&self, other: &Self) -> bool;
}

/// Opaque list operations named in the external-interfaces section: `empty`,
/// `append`, `concat`, `index`, `length`, `slice`.
pub trait RuntimeList<V>: Clone + std::fmt::Debug {
    fn empty() -> Self;
    fn append(&self, v: V) -> Self;
    fn concat(&self, other: &Self) -> Self;
    fn index(&self, i: usize) -> Option<V>;
    fn length(&self) -> usize;
    fn slice(&self, start: usize, end: usize) -> Self;
}

/// Opaque map operations: `find` (returns `None` on a missing key), `get`
/// (the collaborator's own notion of a hard lookup failure), `add`, `npairs`.
pub trait RuntimeMap<V>: Clone + std::fmt::Debug {
    fn find(&self, key: &V) -> Option<V>;
    fn get(&self, key: &V) -> V;
    fn add(&self, key: V, value: V) -> Self;
    fn npairs(&self) -> usize;
}
