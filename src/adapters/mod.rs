pub mod api;
pub mod paj_http;
pub mod paj_replay;
