//! Ready-made menus built on the runtime.

pub mod choice;
pub mod list_menu;
pub mod task_menu;

pub use choice::{choose, confirm};
pub use list_menu::{list_menu, ListHost, ListMenu};
pub use task_menu::{TaskHost, TaskMenu};
