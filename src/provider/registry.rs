use crate::error::Error;
use crate::modbus::RegisterMap;
use crate::provider::{AsciiProvider, ModbusProvider, Provider};
use crate::transport::Transport;

use std::collections::BTreeMap;
use std::sync::Arc;

/// Everything a provider constructor may need.
#[derive(Clone)]
pub struct ProviderArgs {
    pub transport: Arc<dyn Transport>,
    pub slave_id: u8,
    pub register_map: Option<RegisterMap>,
}

impl ProviderArgs {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            slave_id: 1,
            register_map: None,
        }
    }

    pub fn slave_id(mut self, slave_id: u8) -> Self {
        self.slave_id = slave_id;
        self
    }

    pub fn register_map(mut self, map: RegisterMap) -> Self {
        self.register_map = Some(map);
        self
    }
}

pub type Constructor = fn(ProviderArgs) -> Result<Provider, Error>;

/// Provider kind name to constructor.
#[derive(Clone)]
pub struct Registry {
    constructors: BTreeMap<String, Constructor>,
}

impl Default for Registry {
    fn default() -> Self {
        let mut r = Self {
            constructors: BTreeMap::new(),
        };
        r.register(AsciiProvider::KIND, |args| {
            Ok(AsciiProvider::new(args.transport).into())
        });
        r.register(ModbusProvider::KIND, |args| {
            let provider = match args.register_map {
                Some(map) => ModbusProvider::with_map(args.transport, args.slave_id, map)?,
                None => ModbusProvider::new(args.transport, args.slave_id)?,
            };
            Ok(provider.into())
        });
        r
    }
}

impl Registry {
    pub fn register(&mut self, kind: &str, constructor: Constructor) {
        self.constructors.insert(kind.to_owned(), constructor);
    }

    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.constructors.keys().map(String::as_str)
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.constructors.contains_key(kind)
    }

    pub fn create(&self, kind: &str, args: ProviderArgs) -> Result<Provider, Error> {
        let constructor = self
            .constructors
            .get(kind)
            .ok_or_else(|| Error::UnknownProviderKind(kind.to_owned()))?;

        constructor(args)
    }
}
