pub mod bootstrap;
pub mod calendar;
pub mod commands;
pub mod focus_timer;
pub mod session;
