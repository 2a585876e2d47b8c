use super::program::{Slot, SlotInfo};
use super::types::DataType;
use super::Val;
use crate::error;
use crate::lang::{Error, Ident};
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

type Result<T> = std::result::Result<T, Error>;

/// `DEFINT A-Z` and friends: the type of names without a suffix.
#[derive(Debug, Clone)]
pub struct DefTypes([DataType; 26]);

impl Default for DefTypes {
    fn default() -> DefTypes {
        DefTypes(std::array::from_fn(|_| DataType::Single))
    }
}

impl DefTypes {
    pub fn set(&mut self, from: char, to: char, data_type: DataType) {
        let (from, to) = (from.to_ascii_uppercase(), to.to_ascii_uppercase());
        for c in from..=to {
            if c.is_ascii_uppercase() {
                self.0[(c as u8 - b'A') as usize] = data_type.clone();
            }
        }
    }

    pub fn get(&self, name: &str) -> DataType {
        match name.chars().next() {
            Some(c) if c.is_ascii_alphabetic() => {
                self.0[(c.to_ascii_uppercase() as u8 - b'A') as usize].clone()
            }
            _ => DataType::Single,
        }
    }

    /// The type an identifier takes without an `AS` clause.
    pub fn of(&self, ident: &Ident) -> DataType {
        match ident.suffix().and_then(DataType::from_suffix) {
            Some(t) => t,
            None => self.get(ident.base()),
        }
    }
}

fn suffix_char(data_type: &DataType) -> char {
    match data_type.value_type() {
        DataType::Integer => '%',
        DataType::Long => '&',
        DataType::Double => '#',
        DataType::Currency => '@',
        DataType::String => '$',
        _ => '!',
    }
}

/// One namespace: scalars and arrays are kept apart, so `A` and
/// `A(1)` name different variables.
#[derive(Debug, Default, Clone)]
struct Names {
    /// Implicitly typed names, keyed by base name and type suffix.
    typed: HashMap<(Rc<str>, char), Slot>,
    /// Names declared with `AS`, which own every suffix of the base.
    declared: HashMap<Rc<str>, Slot>,
}

/// Maps the names of one routine onto frame slots.
#[derive(Debug, Clone, Default)]
pub struct Scope {
    slots: Vec<SlotInfo>,
    scalars: Names,
    arrays: Names,
    consts: HashMap<Rc<str>, Val>,
    /// Main program variables visible in every routine.
    globals: HashSet<Slot>,
    shared: Vec<(Slot, Slot)>,
    pub deftypes: DefTypes,
}

impl Scope {
    pub fn new(deftypes: DefTypes) -> Scope {
        Scope {
            deftypes,
            ..Scope::default()
        }
    }

    pub fn slots(&self) -> &[SlotInfo] {
        &self.slots
    }

    pub fn slot_type(&self, slot: Slot) -> DataType {
        self.slots
            .get(slot)
            .map(|s| s.data_type.clone())
            .unwrap_or(DataType::Single)
    }

    pub fn into_parts(self) -> (Vec<SlotInfo>, Vec<(Slot, Slot)>) {
        (self.slots, self.shared)
    }

    fn add(&mut self, name: &Rc<str>, data_type: DataType, auto_dim: Option<usize>) -> Slot {
        self.slots.push(SlotInfo {
            name: name.clone(),
            data_type,
            auto_dim,
        });
        self.slots.len() - 1
    }

    fn names(&self, array: bool) -> &Names {
        if array {
            &self.arrays
        } else {
            &self.scalars
        }
    }

    fn names_mut(&mut self, array: bool) -> &mut Names {
        if array {
            &mut self.arrays
        } else {
            &mut self.scalars
        }
    }

    /// An existing variable named by `ident`.
    pub fn find(&self, ident: &Ident, array: bool) -> Result<Option<Slot>> {
        let names = self.names(array);
        let base: Rc<str> = ident.base().into();
        if let Some(slot) = names.declared.get(&base) {
            let declared = self.slot_type(*slot);
            let element = declared.element().cloned().unwrap_or(declared);
            return match ident.suffix() {
                Some(c) if !element.is_scalar() || suffix_char(&element) != c => {
                    Err(error!(DuplicateDefinition))
                }
                _ => Ok(Some(*slot)),
            };
        }
        let key = (base, suffix_char(&self.deftypes.of(ident)));
        Ok(names.typed.get(&key).copied())
    }

    /// Declare a new variable. `as_type` is the element type for arrays.
    pub fn declare(
        &mut self,
        ident: &Ident,
        as_type: Option<DataType>,
        rank: Option<usize>,
        auto_dim: bool,
    ) -> Result<Slot> {
        let array = rank.is_some();
        if self.find(ident, array)?.is_some() {
            return Err(error!(DuplicateDefinition));
        }
        let base: Rc<str> = ident.base().into();
        let element = match &as_type {
            Some(t) => {
                if let Some(c) = ident.suffix() {
                    if !t.is_scalar() || suffix_char(t) != c {
                        return Err(error!(DuplicateDefinition));
                    }
                }
                if self.names(array).typed.keys().any(|(b, _)| *b == base) {
                    return Err(error!(DuplicateDefinition));
                }
                t.clone()
            }
            None => self.deftypes.of(ident),
        };
        let data_type = match rank {
            Some(rank) => DataType::Array(Box::new(element.clone()), rank),
            None => element.clone(),
        };
        let name: Rc<str> = match as_type {
            Some(_) => base.clone(),
            None => format!("{}{}", base, suffix_char(&element)).into(),
        };
        let slot = self.add(&name, data_type, if auto_dim { rank } else { None });
        let names = self.names_mut(array);
        match as_type {
            Some(_) => names.declared.insert(base, slot),
            None => names.typed.insert((base, suffix_char(&element)), slot),
        };
        Ok(slot)
    }

    /// Find a variable, creating an implicitly typed one if needed.
    pub fn resolve(&mut self, ident: &Ident, rank: Option<usize>) -> Result<Slot> {
        match self.find(ident, rank.is_some())? {
            Some(slot) => Ok(slot),
            None => self.declare(ident, None, rank, rank.is_some()),
        }
    }

    /// A local name for the main program variable in slot `root`.
    pub fn alias(&mut self, ident: &Ident, data_type: DataType, root: Slot) -> Result<Slot> {
        let as_type = match &data_type {
            DataType::Array(e, _) => (**e).clone(),
            t => t.clone(),
        };
        let declared = ident.suffix().is_none() && as_type != self.deftypes.of(ident);
        let rank = match &data_type {
            DataType::Array(_, r) => Some(*r),
            _ => None,
        };
        let slot = self.declare(ident, if declared { Some(as_type) } else { None }, rank, false)?;
        self.slots[slot].data_type = data_type;
        self.shared.push((slot, root));
        Ok(slot)
    }

    /// Main program only: mark a variable as `DIM SHARED`.
    pub fn make_global(&mut self, slot: Slot) {
        self.globals.insert(slot);
    }

    pub fn is_global(&self, slot: Slot) -> bool {
        self.globals.contains(&slot)
    }

    pub fn add_hidden(&mut self, name: &str, data_type: DataType) -> Slot {
        let name: Rc<str> = name.into();
        self.add(&name, data_type, None)
    }

    pub fn set_const(&mut self, ident: &Ident, val: Val) -> Result<()> {
        let base: Rc<str> = ident.base().into();
        if self.consts.contains_key(&base) || self.find(ident, false)?.is_some() {
            return Err(error!(DuplicateDefinition));
        }
        self.consts.insert(base, val);
        Ok(())
    }

    pub fn get_const(&self, ident: &Ident) -> Option<&Val> {
        self.consts.get(ident.base())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> Ident {
        Ident::from_name(s)
    }

    #[test]
    fn test_suffix_and_deftype() {
        let mut scope = Scope::default();
        let a = scope.resolve(&id("A"), None).unwrap();
        assert_eq!(scope.resolve(&id("A!"), None).unwrap(), a);
        let b = scope.resolve(&id("A%"), None).unwrap();
        assert_ne!(a, b);
        scope.deftypes.set('A', 'C', DataType::Integer);
        assert_eq!(scope.resolve(&id("A"), None).unwrap(), b);
        assert_eq!(scope.slot_type(b), DataType::Integer);
    }

    #[test]
    fn test_arrays_are_separate() {
        let mut scope = Scope::default();
        let s = scope.resolve(&id("X"), None).unwrap();
        let a = scope.resolve(&id("X"), Some(2)).unwrap();
        assert_ne!(s, a);
        assert_eq!(scope.slots()[a].auto_dim, Some(2));
        assert_eq!(
            scope.slot_type(a),
            DataType::Array(Box::new(DataType::Single), 2)
        );
    }

    #[test]
    fn test_declared_names() {
        let mut scope = Scope::default();
        let n = scope.declare(&id("N"), Some(DataType::Long), None, false).unwrap();
        assert_eq!(scope.resolve(&id("N"), None).unwrap(), n);
        assert_eq!(scope.resolve(&id("N&"), None).unwrap(), n);
        assert_eq!(scope.resolve(&id("N$"), None).unwrap_err().code(), 10);
        let e = scope.declare(&id("N"), Some(DataType::Integer), None, false).unwrap_err();
        assert_eq!(e.code(), 10);
    }

    #[test]
    fn test_consts() {
        let mut scope = Scope::default();
        scope.set_const(&id("PI"), Val::Single(3.14)).unwrap();
        assert_eq!(scope.get_const(&id("PI!")), Some(&Val::Single(3.14)));
        assert!(scope.set_const(&id("PI"), Val::Integer(3)).is_err());
    }
}
