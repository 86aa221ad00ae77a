pub mod in_memory_display_host;
