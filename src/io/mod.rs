// Purpose - external interfaces, format conversions

pub mod converter;
#[cfg(feature = "cpal")]
pub mod cpal_sink;
pub mod midi;
pub mod sink;
