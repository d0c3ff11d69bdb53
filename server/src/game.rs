//! The tic-tac-toe board: moves, turn tracking, win/draw detection,
//! resignation, and the textual rendering sent to clients as payload.

use crate::error::OperationError;
use protocol::Role;
use std::sync::Mutex;

const BOARD_SIZE: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cell {
    Empty,
    X,
    O,
}

impl Cell {
    fn glyph(self) -> char {
        match self {
            Cell::Empty => ' ',
            Cell::X => 'X',
            Cell::O => 'O',
        }
    }

    fn for_role(role: Role) -> Cell {
        match role {
            Role::First => Cell::X,
            Role::Second => Cell::O,
            Role::Null => unreachable!("a move is always made by First or Second"),
        }
    }
}

struct State {
    board: [[Cell; BOARD_SIZE]; BOARD_SIZE],
    turn: Role,
    over: bool,
    winner: Option<Role>,
}

/// A single in-progress or finished match, bound to an accepted invitation
/// for its whole lifetime. All mutating operations take `&self` and
/// serialize internally behind one lock per game.
pub struct Game {
    state: Mutex<State>,
}

/// A move parsed from request text, ready to apply.
pub struct Move {
    role: Role,
    row: usize,
    col: usize,
}

impl Game {
    /// A fresh board: empty, `First` to move, not over.
    pub fn new() -> Self {
        Game {
            state: Mutex::new(State {
                board: [[Cell::Empty; BOARD_SIZE]; BOARD_SIZE],
                turn: Role::First,
                over: false,
                winner: None,
            }),
        }
    }

    /// Parses a decimal position `1..9` from `text` and checks that `role`
    /// is the side to move. Returns the position encoded as (row, col), not
    /// yet applied to the board.
    pub fn parse_move(&self, role: Role, text: &str) -> Result<Move, OperationError> {
        let position: usize = text
            .trim()
            .parse()
            .map_err(|_| OperationError::IllegalMove)?;
        if !(1..=9).contains(&position) {
            return Err(OperationError::IllegalMove);
        }
        let state = self.state.lock().unwrap();
        if state.over {
            return Err(OperationError::GameOver);
        }
        if state.turn != role {
            return Err(OperationError::IllegalMove);
        }
        let zero_based = position - 1;
        Ok(Move {
            role,
            row: zero_based / BOARD_SIZE,
            col: zero_based % BOARD_SIZE,
        })
    }

    /// Applies a previously parsed move: writes the mark, flips the turn,
    /// and evaluates termination.
    pub fn apply_move(&self, mv: Move) -> Result<(), OperationError> {
        let mut state = self.state.lock().unwrap();
        if state.over {
            return Err(OperationError::GameOver);
        }
        if state.turn != mv.role {
            return Err(OperationError::IllegalMove);
        }
        if state.board[mv.row][mv.col] != Cell::Empty {
            return Err(OperationError::IllegalMove);
        }
        state.board[mv.row][mv.col] = Cell::for_role(mv.role);
        state.turn = mv.role.opposite();
        Self::evaluate_termination(&mut state, mv.role);
        Ok(())
    }

    fn evaluate_termination(state: &mut State, mover: Role) {
        let mark = Cell::for_role(mover);
        let board = &state.board;
        let row_win = (0..BOARD_SIZE).any(|r| (0..BOARD_SIZE).all(|c| board[r][c] == mark));
        let col_win = (0..BOARD_SIZE).any(|c| (0..BOARD_SIZE).all(|r| board[r][c] == mark));
        let diag_win = (0..BOARD_SIZE).all(|i| board[i][i] == mark)
            || (0..BOARD_SIZE).all(|i| board[i][BOARD_SIZE - 1 - i] == mark);

        if row_win || col_win || diag_win {
            state.winner = Some(mover);
            state.over = true;
            return;
        }
        let full = board.iter().flatten().all(|cell| *cell != Cell::Empty);
        if full {
            state.winner = None;
            state.over = true;
        }
    }

    /// Resigns the game on behalf of `role`; the other role wins.
    pub fn resign(&self, role: Role) -> Result<(), OperationError> {
        let mut state = self.state.lock().unwrap();
        if state.over {
            return Err(OperationError::GameOver);
        }
        state.winner = Some(role.opposite());
        state.over = true;
        Ok(())
    }

    pub fn is_over(&self) -> bool {
        self.state.lock().unwrap().over
    }

    /// The winner if the game has ended with one, `None` for a draw or an
    /// ongoing game. Callers should check [`Game::is_over`] first to tell
    /// the two apart.
    pub fn winner(&self) -> Option<Role> {
        self.state.lock().unwrap().winner
    }

    /// Renders the board and whose turn it is as text, sent verbatim as
    /// the `ACCEPTED`/`MOVED` payload.
    pub fn unparse_state(&self) -> String {
        let state = self.state.lock().unwrap();
        let row = |r: usize| {
            format!(
                "{}|{}|{}",
                state.board[r][0].glyph(),
                state.board[r][1].glyph(),
                state.board[r][2].glyph()
            )
        };
        let turn_mark = Cell::for_role(state.turn).glyph();
        format!(
            "Game Board:\n{}\n-----\n{}\n-----\n{}\nplayer {} turn\n",
            row(0),
            row(1),
            row(2),
            turn_mark
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn play(game: &Game, role: Role, pos: &str) {
        let mv = game.parse_move(role, pos).unwrap();
        game.apply_move(mv).unwrap();
    }

    #[test]
    fn parse_move_round_trips_every_position() {
        let game = Game::new();
        for pos in 1..=9 {
            let mv = game.parse_move(Role::First, &pos.to_string()).unwrap();
            let expected_row = (pos - 1) / 3;
            let expected_col = (pos - 1) % 3;
            assert_eq!(mv.row, expected_row);
            assert_eq!(mv.col, expected_col);
        }
    }

    #[test]
    fn rejects_move_out_of_range() {
        let game = Game::new();
        assert!(game.parse_move(Role::First, "0").is_err());
        assert!(game.parse_move(Role::First, "10").is_err());
        assert!(game.parse_move(Role::First, "abc").is_err());
    }

    #[test]
    fn rejects_move_by_non_turn_player() {
        let game = Game::new();
        assert!(game.parse_move(Role::Second, "5").is_err());
    }

    #[test]
    fn first_player_wins_top_row() {
        let game = Game::new();
        play(&game, Role::First, "1");
        play(&game, Role::Second, "4");
        play(&game, Role::First, "2");
        play(&game, Role::Second, "5");
        play(&game, Role::First, "3");
        assert!(game.is_over());
        assert_eq!(game.winner(), Some(Role::First));
    }

    #[test]
    fn full_board_with_no_winner_is_a_draw() {
        let game = Game::new();
        // X O X / X O O / O X X
        for (role, pos) in [
            (Role::First, "1"),
            (Role::Second, "2"),
            (Role::First, "3"),
            (Role::Second, "5"),
            (Role::First, "4"),
            (Role::Second, "6"),
            (Role::First, "8"),
            (Role::Second, "7"),
            (Role::First, "9"),
        ] {
            play(&game, role, pos);
        }
        assert!(game.is_over());
        assert_eq!(game.winner(), None);
    }

    #[test]
    fn occupied_cell_is_rejected() {
        let game = Game::new();
        play(&game, Role::First, "5");
        assert!(game.parse_move(Role::Second, "5").is_ok());
        let mv = game.parse_move(Role::Second, "5").unwrap();
        assert!(game.apply_move(mv).is_err());
    }

    #[test]
    fn resign_hands_the_win_to_the_other_role() {
        let game = Game::new();
        game.resign(Role::First).unwrap();
        assert!(game.is_over());
        assert_eq!(game.winner(), Some(Role::Second));
        assert!(game.resign(Role::Second).is_err());
    }
}
