pub mod analyser;
pub mod buffer;
pub mod decode;
pub mod output;
