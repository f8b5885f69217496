pub mod adventure;
pub mod tictactoe;
