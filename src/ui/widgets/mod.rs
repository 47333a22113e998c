pub mod help_view;
pub mod led_row;
pub mod message_line;
pub mod oled;
pub mod status_bar;
