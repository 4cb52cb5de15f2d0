/// Built-in media backends.
pub mod symphonia;
