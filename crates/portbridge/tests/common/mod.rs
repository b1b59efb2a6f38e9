#![allow(dead_code)]

use std::io;
use std::sync::Mutex;

use portbridge::term::{
    Atom, RawWord, TermView, OP_ATOM, OP_INT, OP_PORT, OP_STRING, OP_STRING_CONS, OP_TUPLE,
    OP_UINT,
};
use portbridge::{HostRuntime, Target};

/// A decoded term, for asserting on wire shapes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Atom(String),
    Int(i64),
    Uint(u64),
    Str(Vec<u8>),
    Port(u64),
    Tuple(Vec<Value>),
}

pub fn atom(name: &str) -> Value {
    Value::Atom(name.to_string())
}

pub fn tuple(items: Vec<Value>) -> Value {
    Value::Tuple(items)
}

pub fn bytes(b: &[u8]) -> Value {
    Value::Str(b.to_vec())
}

/// In-process stand-in for the host runtime: interns atoms into a table
/// and records every delivered term, decoded, with its target.
pub struct SimHost {
    smp: bool,
    atoms: Mutex<Vec<String>>,
    delivered: Mutex<Vec<(Target, Value)>>,
}

impl SimHost {
    pub fn new(smp: bool) -> SimHost {
        SimHost {
            smp,
            atoms: Mutex::new(Vec::new()),
            delivered: Mutex::new(Vec::new()),
        }
    }

    pub fn atom_name(&self, id: u64) -> String {
        let atoms = self.atoms.lock().unwrap();
        atoms
            .get((id - 1) as usize)
            .cloned()
            .unwrap_or_else(|| panic!("unknown atom id {id}"))
    }

    pub fn take_delivered(&self) -> Vec<(Target, Value)> {
        std::mem::take(&mut self.delivered.lock().unwrap())
    }

    pub fn decode(&self, view: TermView<'_>) -> Value {
        let mut i = 0;
        let value = self.decode_one(&view, &mut i);
        assert_eq!(i, view.words.len(), "trailing words after term");
        value
    }

    fn decode_one(&self, view: &TermView<'_>, i: &mut usize) -> Value {
        let words: &[RawWord] = view.words;
        match words[*i] {
            OP_ATOM => {
                let id = words[*i + 1];
                *i += 2;
                Value::Atom(self.atom_name(id))
            }
            OP_INT => {
                let v = words[*i + 1] as i64;
                *i += 2;
                Value::Int(v)
            }
            OP_UINT => {
                let v = words[*i + 1];
                *i += 2;
                Value::Uint(v)
            }
            OP_PORT => {
                let v = words[*i + 1];
                *i += 2;
                Value::Port(v)
            }
            OP_STRING => {
                let chunk = words[*i + 1] as usize;
                let len = words[*i + 2] as usize;
                *i += 3;
                let mut data = view.chunks[chunk].bytes()[..len].to_vec();
                while *i < words.len() && words[*i] == OP_STRING_CONS {
                    let c = words[*i + 1] as usize;
                    let l = words[*i + 2] as usize;
                    *i += 3;
                    let mut joined = view.chunks[c].bytes()[..l].to_vec();
                    joined.extend_from_slice(&data);
                    data = joined;
                }
                Value::Str(data)
            }
            OP_TUPLE => {
                let arity = words[*i + 1] as usize;
                *i += 2;
                let mut items = Vec::with_capacity(arity);
                for _ in 0..arity {
                    items.push(self.decode_one(view, i));
                }
                Value::Tuple(items)
            }
            other => panic!("unknown opcode {other} at word {}", *i),
        }
    }
}

impl HostRuntime for SimHost {
    fn intern_atom(&self, name: &str) -> Atom {
        let mut atoms = self.atoms.lock().unwrap();
        if let Some(pos) = atoms.iter().position(|n| n == name) {
            Atom((pos + 1) as u64)
        } else {
            atoms.push(name.to_string());
            Atom(atoms.len() as u64)
        }
    }

    fn send_term(&self, target: Target, term: TermView<'_>) -> io::Result<()> {
        let value = self.decode(term);
        self.delivered.lock().unwrap().push((target, value));
        Ok(())
    }

    fn supports_cross_thread_send(&self) -> bool {
        self.smp
    }
}
