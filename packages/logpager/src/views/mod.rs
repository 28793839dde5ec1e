mod index;

pub use index::index_page;

const CSS: &str = r#"
body { margin: 0; background: #111827; color: #e5e7eb; font-family: ui-monospace, monospace; }
header { display: flex; gap: 1rem; align-items: center; padding: 0.5rem 1rem; background: #1f2937; }
header .target { color: #9ca3af; font-size: 0.85rem; }
header .mode { margin-left: auto; font-size: 0.8rem; padding: 0.1rem 0.5rem; border-radius: 0.25rem; background: #374151; }
header .mode.search { background: #4299e1; color: #fff; }
#search { background: #111827; color: inherit; border: 1px solid #374151; padding: 0.25rem 0.5rem; }
#page { margin: 0; padding: 1rem; white-space: pre-wrap; word-break: break-all; }
#status { position: fixed; bottom: 0; right: 0; padding: 0.25rem 0.75rem; font-size: 0.75rem; color: #9ca3af; }
"#;
