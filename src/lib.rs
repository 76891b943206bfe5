//! Personal task tracker: an ordered task list with priorities, due dates,
//! categories and tags, persisted after every change.

pub mod assistant;
pub mod cli;
pub mod config;
pub mod export;
pub mod menu;
pub mod models;
pub mod render;
pub mod storage;
pub mod todo_list;
pub mod voice;
