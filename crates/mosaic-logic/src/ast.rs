use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, OnceLock};

use serde::{Deserialize, Serialize};

/// A stable identifier for a structurally-distinct formula.
///
/// Two `Formula` values carry the same id exactly when they are
/// structurally equal, for the whole lifetime of the process.
pub type FormulaId = u64;

/// An atomic proposition, evaluated by the graph backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Atom {
    /// Holds at every node, for its full color membership.
    True,
    /// Holds nowhere.
    False,
    /// A named proposition; the backend decides where (and for which
    /// colors) it holds.
    Prop(String),
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Atom::True => write!(f, "true"),
            Atom::False => write!(f, "false"),
            Atom::Prop(name) => write!(f, "{name}"),
        }
    }
}

/// The CTL operator set.
///
/// The checker evaluates the `{Atom, Negation, And, Or, ExistsNext,
/// ExistsUntil, AllUntil}` basis directly; the remaining operators are
/// sugar that [`crate::normalize`] rewrites away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Atom,
    Negation,
    And,
    Or,
    ExistsNext,
    ExistsUntil,
    AllUntil,
    AllNext,
    ExistsFuture,
    AllFuture,
    ExistsGlobally,
    AllGlobally,
}

impl Operator {
    /// Number of operands the operator takes.
    pub fn arity(self) -> usize {
        match self {
            Operator::Atom => 0,
            Operator::Negation
            | Operator::ExistsNext
            | Operator::AllNext
            | Operator::ExistsFuture
            | Operator::AllFuture
            | Operator::ExistsGlobally
            | Operator::AllGlobally => 1,
            Operator::And | Operator::Or | Operator::ExistsUntil | Operator::AllUntil => 2,
        }
    }
}

#[derive(Debug)]
struct FormulaNode {
    id: FormulaId,
    operator: Operator,
    atom: Option<Atom>,
    operands: Vec<Formula>,
}

/// A hash-consed CTL formula.
///
/// Cheap to clone (one `Arc`). Equality and hashing go through the interned
/// identity, never the structure.
#[derive(Clone)]
pub struct Formula(Arc<FormulaNode>);

#[derive(PartialEq, Eq, Hash)]
enum InternKey {
    Atom(Atom),
    Compound(Operator, Vec<FormulaId>),
}

struct Interner {
    formulas: HashMap<InternKey, Formula>,
    next_id: FormulaId,
}

fn interner() -> &'static Mutex<Interner> {
    static INTERNER: OnceLock<Mutex<Interner>> = OnceLock::new();
    INTERNER.get_or_init(|| {
        Mutex::new(Interner {
            formulas: HashMap::new(),
            next_id: 0,
        })
    })
}

fn intern(key: InternKey, operator: Operator, atom: Option<Atom>, operands: Vec<Formula>) -> Formula {
    let mut interner = interner().lock().unwrap_or_else(|e| e.into_inner());
    if let Some(existing) = interner.formulas.get(&key) {
        return existing.clone();
    }
    let id = interner.next_id;
    interner.next_id += 1;
    let formula = Formula(Arc::new(FormulaNode {
        id,
        operator,
        atom,
        operands,
    }));
    interner.formulas.insert(key, formula.clone());
    formula
}

impl Formula {
    /// An atomic formula.
    pub fn atom(atom: Atom) -> Formula {
        intern(InternKey::Atom(atom.clone()), Operator::Atom, Some(atom), Vec::new())
    }

    /// Shorthand for a named proposition.
    pub fn prop(name: &str) -> Formula {
        Formula::atom(Atom::Prop(name.to_string()))
    }

    /// The `true` constant.
    pub fn tt() -> Formula {
        Formula::atom(Atom::True)
    }

    /// The `false` constant.
    pub fn ff() -> Formula {
        Formula::atom(Atom::False)
    }

    fn compound(operator: Operator, operands: Vec<Formula>) -> Formula {
        debug_assert_eq!(operator.arity(), operands.len());
        let key = InternKey::Compound(operator, operands.iter().map(Formula::id).collect());
        intern(key, operator, None, operands)
    }

    pub fn negation(inner: &Formula) -> Formula {
        Formula::compound(Operator::Negation, vec![inner.clone()])
    }

    pub fn and(left: &Formula, right: &Formula) -> Formula {
        Formula::compound(Operator::And, vec![left.clone(), right.clone()])
    }

    pub fn or(left: &Formula, right: &Formula) -> Formula {
        Formula::compound(Operator::Or, vec![left.clone(), right.clone()])
    }

    /// `EX inner`: `inner` holds at some immediate successor.
    pub fn exists_next(inner: &Formula) -> Formula {
        Formula::compound(Operator::ExistsNext, vec![inner.clone()])
    }

    /// `E (path U goal)`: some path stays in `path` until it reaches `goal`.
    pub fn exists_until(path: &Formula, goal: &Formula) -> Formula {
        Formula::compound(Operator::ExistsUntil, vec![path.clone(), goal.clone()])
    }

    /// `A (path U goal)`: every path stays in `path` until it reaches `goal`.
    pub fn all_until(path: &Formula, goal: &Formula) -> Formula {
        Formula::compound(Operator::AllUntil, vec![path.clone(), goal.clone()])
    }

    pub fn all_next(inner: &Formula) -> Formula {
        Formula::compound(Operator::AllNext, vec![inner.clone()])
    }

    pub fn exists_future(inner: &Formula) -> Formula {
        Formula::compound(Operator::ExistsFuture, vec![inner.clone()])
    }

    pub fn all_future(inner: &Formula) -> Formula {
        Formula::compound(Operator::AllFuture, vec![inner.clone()])
    }

    pub fn exists_globally(inner: &Formula) -> Formula {
        Formula::compound(Operator::ExistsGlobally, vec![inner.clone()])
    }

    pub fn all_globally(inner: &Formula) -> Formula {
        Formula::compound(Operator::AllGlobally, vec![inner.clone()])
    }

    pub fn id(&self) -> FormulaId {
        self.0.id
    }

    pub fn operator(&self) -> Operator {
        self.0.operator
    }

    /// The atom payload; present exactly when `operator() == Operator::Atom`.
    pub fn as_atom(&self) -> Option<&Atom> {
        self.0.atom.as_ref()
    }

    /// The `index`-th operand.
    ///
    /// Panics when `index >= operator().arity()`; callers dispatch on the
    /// operator first, so an out-of-range access is a programmer error.
    pub fn operand(&self, index: usize) -> &Formula {
        &self.0.operands[index]
    }

    pub fn operands(&self) -> &[Formula] {
        &self.0.operands
    }
}

impl PartialEq for Formula {
    fn eq(&self, other: &Self) -> bool {
        self.0.id == other.0.id
    }
}

impl Eq for Formula {}

impl std::hash::Hash for Formula {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.0.id.hash(state);
    }
}

impl fmt::Debug for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Formula#{}({self})", self.0.id)
    }
}

impl fmt::Display for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.operator() {
            Operator::Atom => match self.as_atom() {
                Some(atom) => write!(f, "{atom}"),
                None => write!(f, "?"),
            },
            Operator::Negation => write!(f, "!{}", self.operand(0)),
            Operator::And => write!(f, "({} && {})", self.operand(0), self.operand(1)),
            Operator::Or => write!(f, "({} || {})", self.operand(0), self.operand(1)),
            Operator::ExistsNext => write!(f, "EX {}", self.operand(0)),
            Operator::AllNext => write!(f, "AX {}", self.operand(0)),
            Operator::ExistsFuture => write!(f, "EF {}", self.operand(0)),
            Operator::AllFuture => write!(f, "AF {}", self.operand(0)),
            Operator::ExistsGlobally => write!(f, "EG {}", self.operand(0)),
            Operator::AllGlobally => write!(f, "AG {}", self.operand(0)),
            Operator::ExistsUntil => {
                write!(f, "E ({} U {})", self.operand(0), self.operand(1))
            }
            Operator::AllUntil => write!(f, "A ({} U {})", self.operand(0), self.operand(1)),
        }
    }
}
