mod item_list;

pub use item_list::ItemListView;
