pub mod models;
pub mod paj_payload;
pub mod sensor_values;
pub mod session_state;
