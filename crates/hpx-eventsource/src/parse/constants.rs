//! Wire constants of the event stream format.

/// Newline byte
pub(crate) const LF: u8 = b'\n';
/// Carriage return byte
pub(crate) const CR: u8 = b'\r';

/// Byte Order Mark as char
const BOM_CHAR: char = '\u{FEFF}';
const BOM_LEN: usize = BOM_CHAR.len_utf8();
/// Byte representation of the BOM [`char`]
pub(crate) const BOM: &[u8; BOM_LEN] = &{
    let mut buf = [0u8; BOM_LEN];
    BOM_CHAR.encode_utf8(&mut buf);
    buf
};

/// Sequences that end an event block.
pub(crate) const TERMINATORS: [&[u8]; 3] = [&[LF, LF], &[CR, CR], &[CR, LF, CR, LF]];

/// Separator between a field key and its value.
pub(crate) const KEY_VALUE_DELIMITER: &str = ": ";

pub(crate) const ID_KEY: &str = "id";
pub(crate) const EVENT_KEY: &str = "event";
pub(crate) const DATA_KEY: &str = "data";
pub(crate) const RETRY_KEY: &str = "retry";
