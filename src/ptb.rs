//! Programmable transaction model: inputs, commands and argument handles.
//!
//! The builder mirrors the ledger's own layout closely enough that a
//! `TransactionKind` can be BCS-encoded for simulated calls once every object
//! input has been resolved to an owned reference or a shared version.

use serde::Serialize;
use std::collections::HashMap;

use crate::types::Address;

/// Handle to a value inside a transaction. Only meaningful within the
/// transaction that produced it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Argument {
    GasCoin,
    Input(u16),
    Result(u16),
    NestedResult(u16, u16),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Input {
    Pure(Vec<u8>),
    Object { id: Address, mutable: bool },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MoveCall {
    pub package: Address,
    pub module: String,
    pub function: String,
    pub arguments: Vec<Argument>,
}

impl MoveCall {
    pub fn target(&self) -> String {
        format!("{}::{}::{}", self.package, self.module, self.function)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    MoveCall(MoveCall),
    SplitCoins(Argument, Vec<Argument>),
    MergeCoins(Argument, Vec<Argument>),
}

#[derive(Debug, thiserror::Error)]
pub enum PtbError {
    #[error("object {0} was not resolved")]
    UnresolvedObject(Address),
    #[error("too many {0} in one transaction")]
    Overflow(&'static str),
    #[error("bcs: {0}")]
    Bcs(#[from] bcs::Error),
}

#[derive(Clone, Debug, Default)]
pub struct Transaction {
    sender: Option<Address>,
    inputs: Vec<Input>,
    commands: Vec<Command>,
}

impl Transaction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sender(&self) -> Option<Address> {
        self.sender
    }

    pub fn set_sender(&mut self, sender: Address) {
        self.sender = Some(sender);
    }

    pub fn set_sender_if_not_set(&mut self, sender: Address) {
        if self.sender.is_none() {
            self.sender = Some(sender);
        }
    }

    pub fn inputs(&self) -> &[Input] {
        &self.inputs
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn move_calls(&self) -> impl Iterator<Item = &MoveCall> {
        self.commands.iter().filter_map(|c| match c {
            Command::MoveCall(m) => Some(m),
            _ => None,
        })
    }

    pub fn input(&self, arg: Argument) -> Option<&Input> {
        match arg {
            Argument::Input(i) => self.inputs.get(i as usize),
            _ => None,
        }
    }

    /// Object input, mutable. The same id always maps to the same input slot.
    pub fn object(&mut self, id: Address) -> Argument {
        self.object_with(id, true)
    }

    /// Object input that the call only reads (e.g. the system clock).
    pub fn object_readonly(&mut self, id: Address) -> Argument {
        self.object_with(id, false)
    }

    fn object_with(&mut self, id: Address, mutable: bool) -> Argument {
        for (i, input) in self.inputs.iter_mut().enumerate() {
            if let Input::Object { id: existing, mutable: m } = input {
                if *existing == id {
                    *m |= mutable;
                    return Argument::Input(i as u16);
                }
            }
        }
        self.push_input(Input::Object { id, mutable })
    }

    fn push_input(&mut self, input: Input) -> Argument {
        self.inputs.push(input);
        Argument::Input((self.inputs.len() - 1) as u16)
    }

    fn push_command(&mut self, cmd: Command) -> u16 {
        self.commands.push(cmd);
        (self.commands.len() - 1) as u16
    }

    /// BCS-encoded pure input.
    pub fn pure<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<Argument, PtbError> {
        let bytes = bcs::to_bytes(value)?;
        Ok(self.push_input(Input::Pure(bytes)))
    }

    pub fn pure_u8(&mut self, v: u8) -> Argument {
        self.push_input(Input::Pure(vec![v]))
    }

    pub fn pure_u64(&mut self, v: u64) -> Argument {
        self.push_input(Input::Pure(v.to_le_bytes().to_vec()))
    }

    pub fn pure_bool(&mut self, v: bool) -> Argument {
        self.push_input(Input::Pure(vec![v as u8]))
    }

    pub fn pure_address(&mut self, a: Address) -> Argument {
        self.push_input(Input::Pure(a.as_bytes().to_vec()))
    }

    pub fn move_call(
        &mut self,
        package: Address,
        module: &str,
        function: &str,
        arguments: Vec<Argument>,
    ) -> Argument {
        let idx = self.push_command(Command::MoveCall(MoveCall {
            package,
            module: module.to_string(),
            function: function.to_string(),
            arguments,
        }));
        Argument::Result(idx)
    }

    /// Split `amounts` off `coin`; one handle per amount.
    pub fn split_coins(&mut self, coin: Argument, amounts: &[u64]) -> Vec<Argument> {
        let args: Vec<Argument> = amounts.iter().map(|a| self.pure_u64(*a)).collect();
        let idx = self.push_command(Command::SplitCoins(coin, args));
        (0..amounts.len())
            .map(|i| Argument::NestedResult(idx, i as u16))
            .collect()
    }

    pub fn merge_coins(&mut self, destination: Argument, sources: Vec<Argument>) {
        self.push_command(Command::MergeCoins(destination, sources));
    }

    /// Object ids referenced by inputs, in input order.
    pub fn object_ids(&self) -> Vec<Address> {
        self.inputs
            .iter()
            .filter_map(|i| match i {
                Input::Object { id, .. } => Some(*id),
                Input::Pure(_) => None,
            })
            .collect()
    }

    /// BCS `TransactionKind::ProgrammableTransaction` for simulated execution.
    pub fn to_kind_bytes(
        &self,
        resolved: &HashMap<Address, ObjectOwnership>,
    ) -> Result<Vec<u8>, PtbError> {
        if self.inputs.len() > u16::MAX as usize {
            return Err(PtbError::Overflow("inputs"));
        }
        if self.commands.len() > u16::MAX as usize {
            return Err(PtbError::Overflow("commands"));
        }
        let inputs = self
            .inputs
            .iter()
            .map(|input| match input {
                Input::Pure(b) => Ok(wire::CallArg::Pure(b.clone())),
                Input::Object { id, mutable } => {
                    let own = resolved.get(id).ok_or(PtbError::UnresolvedObject(*id))?;
                    Ok(wire::CallArg::Object(match own {
                        ObjectOwnership::Shared {
                            initial_shared_version,
                        } => wire::ObjectArg::SharedObject {
                            id: *id,
                            initial_shared_version: *initial_shared_version,
                            mutable: *mutable,
                        },
                        ObjectOwnership::Owned { version, digest } => {
                            wire::ObjectArg::ImmOrOwnedObject((*id, *version, digest.to_vec()))
                        }
                    }))
                }
            })
            .collect::<Result<Vec<_>, PtbError>>()?;

        let commands = self.commands.iter().map(wire::Command::from).collect();
        let kind = wire::TransactionKind::ProgrammableTransaction(wire::Programmable {
            inputs,
            commands,
        });
        Ok(bcs::to_bytes(&kind)?)
    }
}

/// How an object input must be referenced when encoding.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ObjectOwnership {
    /// Address-owned or immutable: exact version and digest.
    Owned { version: u64, digest: [u8; 32] },
    Shared { initial_shared_version: u64 },
}

/// On-wire shapes. Variant order is the BCS tag and must not change.
mod wire {
    use super::Argument;
    use crate::types::Address;
    use serde::Serialize;

    #[derive(Serialize)]
    pub enum TransactionKind {
        ProgrammableTransaction(Programmable),
    }

    #[derive(Serialize)]
    pub struct Programmable {
        pub inputs: Vec<CallArg>,
        pub commands: Vec<Command>,
    }

    #[derive(Serialize)]
    pub enum CallArg {
        Pure(Vec<u8>),
        Object(ObjectArg),
    }

    #[derive(Serialize)]
    pub enum ObjectArg {
        ImmOrOwnedObject((Address, u64, Vec<u8>)),
        SharedObject {
            id: Address,
            initial_shared_version: u64,
            mutable: bool,
        },
    }

    #[derive(Serialize)]
    pub enum TypeTag {}

    #[derive(Serialize)]
    pub struct MoveCall {
        pub package: Address,
        pub module: String,
        pub function: String,
        pub type_arguments: Vec<TypeTag>,
        pub arguments: Vec<Argument>,
    }

    #[derive(Serialize)]
    pub enum Command {
        MoveCall(Box<MoveCall>),
        // holds tag 1; this client never transfers objects
        #[allow(dead_code)]
        TransferObjects(Vec<Argument>, Argument),
        SplitCoins(Argument, Vec<Argument>),
        MergeCoins(Argument, Vec<Argument>),
    }

    impl From<&super::Command> for Command {
        fn from(c: &super::Command) -> Self {
            match c {
                super::Command::MoveCall(m) => Command::MoveCall(Box::new(MoveCall {
                    package: m.package,
                    module: m.module.clone(),
                    function: m.function.clone(),
                    type_arguments: Vec::new(),
                    arguments: m.arguments.clone(),
                })),
                super::Command::SplitCoins(coin, amounts) => {
                    Command::SplitCoins(*coin, amounts.clone())
                }
                super::Command::MergeCoins(dst, srcs) => Command::MergeCoins(*dst, srcs.clone()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(b: u8) -> Address {
        Address::new([b; 32])
    }

    #[test]
    fn same_object_reuses_input_slot() {
        let mut tx = Transaction::new();
        let clock = tx.object_readonly(id(6));
        let again = tx.object(id(6));
        assert_eq!(clock, again);
        assert_eq!(tx.inputs().len(), 1);
        assert_eq!(
            tx.inputs()[0],
            Input::Object {
                id: id(6),
                mutable: true
            }
        );
    }

    #[test]
    fn split_returns_nested_handles() {
        let mut tx = Transaction::new();
        let coin = tx.object(id(1));
        let parts = tx.split_coins(coin, &[5, 7]);
        assert_eq!(
            parts,
            vec![Argument::NestedResult(0, 0), Argument::NestedResult(0, 1)]
        );
        assert_eq!(tx.input(Argument::Input(1)), Some(&Input::Pure(5u64.to_le_bytes().to_vec())));
    }

    #[test]
    fn sender_is_only_set_once() {
        let mut tx = Transaction::new();
        tx.set_sender(id(1));
        tx.set_sender_if_not_set(id(2));
        assert_eq!(tx.sender(), Some(id(1)));
    }

    #[test]
    fn kind_bytes_encode_tags_in_wire_order() {
        let mut tx = Transaction::new();
        let book = tx.object(id(9));
        let n = tx.pure_u8(1);
        tx.move_call(id(2), "m", "f", vec![book, n]);

        let mut resolved = HashMap::new();
        resolved.insert(
            id(9),
            ObjectOwnership::Shared {
                initial_shared_version: 3,
            },
        );
        let bytes = tx.to_kind_bytes(&resolved).unwrap();

        // kind tag, input count, Object tag, SharedObject tag
        assert_eq!(&bytes[..4], &[0, 2, 1, 1]);
        assert_eq!(&bytes[4..36], id(9).as_bytes());
        assert_eq!(&bytes[36..44], &3u64.to_le_bytes());
        assert_eq!(bytes[44], 1); // mutable
        // Pure tag, length, value
        assert_eq!(&bytes[45..48], &[0, 1, 1]);
        // command count, MoveCall tag, package
        assert_eq!(&bytes[48..50], &[1, 0]);
        assert_eq!(&bytes[50..82], id(2).as_bytes());
        // "m", "f", no type args, two args: Input(0), Input(1)
        assert_eq!(&bytes[82..], &[1, b'm', 1, b'f', 0, 2, 1, 0, 0, 1, 1, 0]);
    }

    #[test]
    fn coin_commands_keep_their_wire_tags() {
        let mut tx = Transaction::new();
        let part = tx.split_coins(Argument::GasCoin, &[5])[0];
        tx.merge_coins(Argument::GasCoin, vec![part]);
        let bytes = tx.to_kind_bytes(&HashMap::new()).unwrap();

        assert_eq!(&bytes[..4], &[0, 1, 0, 8]);
        assert_eq!(&bytes[4..12], &5u64.to_le_bytes());
        // SplitCoins is tag 2 and MergeCoins tag 3
        assert_eq!(
            &bytes[12..],
            &[2, 2, 0, 1, 1, 0, 0, 3, 0, 1, 3, 0, 0, 0, 0]
        );
    }

    #[test]
    fn unresolved_objects_fail_encoding() {
        let mut tx = Transaction::new();
        let o = tx.object(id(4));
        tx.merge_coins(o, vec![]);
        assert!(matches!(
            tx.to_kind_bytes(&HashMap::new()),
            Err(PtbError::UnresolvedObject(a)) if a == id(4)
        ));
    }
}
