pub mod base_serializer;
pub mod document;
pub mod front_matter;
pub mod todo_parser;

pub use base_serializer::serialize_base;
pub use document::{DocumentLines, locate_line};
pub use front_matter::{parse_front_matter, render_front_matter};
pub use todo_parser::{
    TodoLineMatch, extract_references, links_to_entity, parse_bare_reference,
    parse_checklist_line, parse_todo_line, strip_link_syntax,
};
