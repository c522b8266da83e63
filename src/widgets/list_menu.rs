//! Plain list menu: pick one item from a list of displayable values.

use std::fmt::Display;

use crate::core::screen::Color;
use crate::runtime::menu::{Menu, MenuHost};
use crate::runtime::state::{MenuOptions, MenuState};

type ColorFn<T> = Box<dyn Fn(&T) -> Option<Color>>;

pub struct ListHost<T> {
    menu: MenuState<T>,
    item_color: Option<ColorFn<T>>,
}

impl<T> ListHost<T> {
    pub fn new<F>(items: Vec<T>, display: F, options: MenuOptions) -> Self
    where
        F: Fn(&T) -> String + 'static,
    {
        Self {
            menu: MenuState::new(items, display, options),
            item_color: None,
        }
    }

    pub fn with_item_color<F>(mut self, item_color: F) -> Self
    where
        F: Fn(&T) -> Option<Color> + 'static,
    {
        self.item_color = Some(Box::new(item_color));
        self
    }

    pub fn selected(&self) -> Option<&T> {
        self.menu.selected_item()
    }
}

impl<T: 'static> MenuHost for ListHost<T> {
    type Item = T;

    fn menu(&self) -> &MenuState<T> {
        &self.menu
    }

    fn menu_mut(&mut self) -> &mut MenuState<T> {
        &mut self.menu
    }

    fn item_color(&self, item: &T) -> Option<Color> {
        self.item_color.as_ref().and_then(|item_color| item_color(item))
    }
}

pub type ListMenu<T> = Menu<ListHost<T>>;

/// List menu showing each item through its `Display` impl.
pub fn list_menu<T: Display + 'static>(items: Vec<T>, options: MenuOptions) -> ListMenu<T> {
    Menu::new(ListHost::new(items, |item: &T| item.to_string(), options))
}
