pub mod ascii;
pub mod modbus;
pub mod registry;

pub use ascii::AsciiProvider;
pub use modbus::ModbusProvider;
pub use registry::{ProviderArgs, Registry};

use crate::error::Error;
use crate::snapshot::CanonicalSnapshot;

use async_trait::async_trait;

/// Uniform surface over every inverter protocol.
#[async_trait]
pub trait InverterProvider: Send + Sync {
    fn kind(&self) -> &'static str;

    /// Cheap round-trip. Any failure is `false`, never an error.
    async fn probe(&self) -> bool;

    /// Full exchange. Either every required response decoded or an error;
    /// never a snapshot built from partial data.
    async fn read_snapshot(&self) -> Result<CanonicalSnapshot, Error>;
}

pub enum Provider {
    Ascii(AsciiProvider),
    Modbus(ModbusProvider),
}

#[async_trait]
impl InverterProvider for Provider {
    fn kind(&self) -> &'static str {
        match self {
            Provider::Ascii(p) => p.kind(),
            Provider::Modbus(p) => p.kind(),
        }
    }

    async fn probe(&self) -> bool {
        match self {
            Provider::Ascii(p) => p.probe().await,
            Provider::Modbus(p) => p.probe().await,
        }
    }

    async fn read_snapshot(&self) -> Result<CanonicalSnapshot, Error> {
        match self {
            Provider::Ascii(p) => p.read_snapshot().await,
            Provider::Modbus(p) => p.read_snapshot().await,
        }
    }
}

impl From<AsciiProvider> for Provider {
    fn from(p: AsciiProvider) -> Self {
        Provider::Ascii(p)
    }
}

impl From<ModbusProvider> for Provider {
    fn from(p: ModbusProvider) -> Self {
        Provider::Modbus(p)
    }
}
