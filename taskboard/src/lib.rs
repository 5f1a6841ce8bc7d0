//! `Taskboard`: client-side task board state and synchronization engine.
//!
//! The [`board::Board`] controller ties together the Task Store, the Subtask
//! Cache, the optimistic mutation executor, drag-and-drop handling and the
//! filter/sort pipeline over any [`backend::TaskBackend`].

pub mod backend;
pub mod board;
pub mod config;
pub mod drag;
pub mod guard;
pub mod mutation;
pub mod store;
pub mod subtasks;
pub mod view;
