use tape_menu::{MenuOptions, MenuState};

/// Small deterministic generator so failures reproduce.
struct Lcg(u64);

impl Lcg {
    fn next(&mut self) -> u64 {
        self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        self.0 >> 33
    }
}

fn assert_in_bounds(menu: &MenuState<String>) {
    let row = menu.selected_row();
    let count = menu.matched_count();
    if count == 0 {
        assert_eq!(row, -1);
    } else {
        assert!((0..count as isize).contains(&row), "row {row} outside 0..{count}");
    }
}

#[test]
fn navigation_and_resizes_keep_the_selection_in_bounds() {
    let mut rng = Lcg(7);
    for count in 0..20usize {
        let items = (0..count).map(|index| format!("item {index}")).collect();
        let mut menu = MenuState::new(items, |item: &String| item.clone(), MenuOptions::default());
        for _ in 0..200 {
            match rng.next() % 9 {
                0 => menu.move_selection(-1, false),
                1 => menu.move_selection(1, false),
                2 => menu.move_selection(1, true),
                3 => menu.page_up(),
                4 => menu.page_down(),
                5 => menu.select_first(),
                6 => menu.select_end(),
                7 => menu.set_items_per_page(1 + (rng.next() % 6) as usize),
                _ => menu.toggle_multi_select(),
            }
            assert_in_bounds(&menu);
        }
    }
}

#[test]
fn shrinking_the_item_list_clamps_the_selection() {
    let items = (0..10).map(|index| format!("item {index}")).collect();
    let mut menu = MenuState::new(items, |item: &String| item.clone(), MenuOptions::default());
    menu.select_row(9);
    menu.set_items((0..4).map(|index| format!("item {index}")).collect());
    assert_eq!(menu.selected_row(), 3);
    menu.clear_items();
    assert_eq!(menu.selected_row(), -1);
    menu.append_item("back".to_string());
    assert_eq!(menu.selected_row(), 0);
}

#[test]
fn adding_tokens_never_grows_the_match_set() {
    let words = ["ab", "cd", "abc", "x", "b c", "dab"];
    let items: Vec<String> = vec!["abcdx", "xcdab", "ab", "b c d", "dabx", ""]
        .into_iter()
        .map(String::from)
        .collect();
    let mut menu = MenuState::new(items, |item: &String| item.clone(), MenuOptions::default());
    assert_eq!(menu.matched_count(), 6);

    let mut query = String::new();
    let mut previous = menu.matched().to_vec();
    for word in words {
        if !query.is_empty() {
            query.push(' ');
        }
        query.push_str(word);
        menu.set_input(query.clone());
        menu.refresh_matches();
        let current = menu.matched().to_vec();
        assert!(current.iter().all(|index| previous.contains(index)), "{query:?} grew the set");
        previous = current;
    }
}
