pub mod command;
pub mod packet;

pub use command::{Command, FieldKind, FieldSpec, Schema};
pub use packet::{decode_raw, decode_response, encode_command, AsciiFields, FieldValue};
