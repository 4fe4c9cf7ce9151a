pub mod field_map;
pub mod issue;
pub mod transition;
pub mod work_item;
