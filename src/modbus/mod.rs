pub mod packet;
pub mod register_map;
pub mod telemetry;

pub use packet::{
    decode_read_response, decode_write_response, DecodedRegisterBlock, FrameCommon, FunctionCode,
    ReadHolding, Request, WriteMultiple,
};
pub use register_map::{FieldType, RegisterMap, RegisterMapEntry, RegisterValue, RegisterValues};
pub use telemetry::{
    recommended_read_frames, BatteryState, PowerFlow, ReadBlock, RuntimeTelemetry,
    RECOMMENDED_BLOCKS,
};
