pub mod listener_refresh;
