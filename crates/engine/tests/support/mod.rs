pub mod file_row;
