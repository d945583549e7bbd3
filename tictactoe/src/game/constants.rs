/// Side length of the square board.
pub const BOARD_SIZE: usize = 3;
/// Seats in a match. Never more.
pub const MAX_SEATS: usize = 2;
/// Cap on user-supplied strings (user ids, display names).
pub const MAX_USER_INPUT_LENGTH: usize = 64;
