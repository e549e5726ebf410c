pub mod constants;
pub mod state;
pub mod store;
pub mod spatial;
pub mod damage;
pub mod systems;
pub mod match_result;
pub mod round;
pub mod game_loop;
pub mod performance;
