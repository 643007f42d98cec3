//! A minimal in-memory `RuntimeValue` used only by the compiler crate's own
//! tests; not a real Avalanche runtime.

use crate::value::{RuntimeList, RuntimeMap, RuntimeValue};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

#[derive(Debug, Clone, PartialEq)]
pub enum TestValue {
    Str(String),
    Int(i64),
    Function(String),
    List(TestList),
    Map(TestMap),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TestList(Vec<TestValue>);

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TestMap(Vec<(TestValue, TestValue)>);

impl RuntimeValue for TestValue {
    type List = TestList;
    type Map = TestMap;

    fn to_string_value(&self) -> String {
        match self {
            TestValue::Str(s) => s.clone(),
            TestValue::Int(i) => i.to_string(),
            TestValue::Function(name) => format!("<fun {name}>"),
            TestValue::List(l) => format!("{:?}", l.0),
            TestValue::Map(m) => format!("{:?}", m.0),
        }
    }

    fn of_string(s: &str) -> Self {
        TestValue::Str(s.to_string())
    }

    fn of_integer(i: i64) -> Self {
        TestValue::Int(i)
    }

    fn of_function(name: &str) -> Self {
        TestValue::Function(name.to_string())
    }

    fn value_hash(&self) -> u64 {
        let mut h = DefaultHasher::new();
        self.to_string_value().hash(&mut h);
        h.finish()
    }

    fn value_eq(&self, other: &Self) -> bool {
        self == other
    }
}

impl RuntimeList<TestValue> for TestList {
    fn empty() -> Self {
        TestList(Vec::new())
    }

    fn append(&self, v: TestValue) -> Self {
        let mut next = self.0.clone();
        next.push(v);
        TestList(next)
    }

    fn concat(&self, other: &Self) -> Self {
        let mut next = self.0.clone();
        next.extend(other.0.clone());
        TestList(next)
    }

    fn index(&self, i: usize) -> Option<TestValue> {
        self.0.get(i).cloned()
    }

    fn length(&self) -> usize {
        self.0.len()
    }

    fn slice(&self, start: usize, end: usize) -> Self {
        let start = start.min(self.0.len());
        let end = end.min(self.0.len()).max(start);
        TestList(self.0[start..end].to_vec())
    }
}

impl RuntimeMap<TestValue> for TestMap {
    fn find(&self, key: &TestValue) -> Option<TestValue> {
        self.0
            .iter()
            .find(|(k, _)| k.value_eq(key))
            .map(|(_, v)| v.clone())
    }

    fn get(&self, key: &TestValue) -> TestValue {
        self.find(key).expect("key not present in test map")
    }

    fn add(&self, key: TestValue, value: TestValue) -> Self {
        let mut next = self.0.clone();
        next.retain(|(k, _)| !k.value_eq(&key));
        next.push((key, value));
        TestMap(next)
    }

    fn npairs(&self) -> usize {
        self.0.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_append_and_index() {
        let l = TestList::empty()
            .append(TestValue::Int(1))
            .append(TestValue::Int(2));
        assert_eq!(l.length(), 2);
        assert_eq!(l.index(1), Some(TestValue::Int(2)));
    }

    #[test]
    fn map_add_overwrites_existing_key() {
        let m = TestMap::default().add(TestValue::Str("a".into()), TestValue::Int(1));
        let m = m.add(TestValue::Str("a".into()), TestValue::Int(2));
        assert_eq!(m.npairs(), 1);
        assert_eq!(m.get(&TestValue::Str("a".into())), TestValue::Int(2));
    }
}
