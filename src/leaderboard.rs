use std::cmp::Ordering;

use crate::api::LeaderboardUser;

pub const MAX_LIMIT: u32 = 100;

fn compare(a: &LeaderboardUser, b: &LeaderboardUser) -> Ordering {
    b.correct_predictions
        .cmp(&a.correct_predictions)
        .then_with(|| b.token_balance.cmp(&a.token_balance))
        .then_with(|| a.user.cmp(&b.user))
}

/// Most correct predictions first, then the larger balance, then the
/// lower key. Ranks start at 1 and have no gaps.
pub fn rank_users(mut users: Vec<LeaderboardUser>) -> Vec<LeaderboardUser> {
    users.sort_by(compare);
    for (position, user) in users.iter_mut().enumerate() {
        user.rank = position as u32 + 1;
    }
    users
}

/// `page` starts at 1, `limit` is capped at [`MAX_LIMIT`].
pub fn leaderboard_page(users: Vec<LeaderboardUser>, page: u32, limit: u32) -> Vec<LeaderboardUser> {
    if page == 0 || limit == 0 {
        return vec![];
    }
    let limit = limit.min(MAX_LIMIT) as usize;
    let start = (page as usize - 1).saturating_mul(limit);
    rank_users(users).into_iter().skip(start).take(limit).collect()
}
