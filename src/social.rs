//! Follow/unfollow bookkeeping on a pair of user documents.
//!
//! `friends` on a user lists the people they follow. `requests` lists people
//! who follow them without being followed back. Both functions only touch the
//! two in-memory documents; persisting them is the caller's job.
//!
//! Known defect, kept as observed behavior: following always adds the target
//! to the follower's friends, even when the follow is not reciprocated, and
//! repeated follows append duplicate friend entries.

use crate::user::User;

/// `user` follows `target`.
pub fn follow(user: &mut User, target: &mut User) {
    if target.friends.contains(&user.id) {
        // answering a pending request
        user.friends.push(target.id.clone());
        user.requests.retain(|id| id != &target.id);
    } else {
        if !target.requests.contains(&user.id) {
            target.requests.push(user.id.clone());
        }
        user.friends.push(target.id.clone());
    }
}

/// `user` unfollows `target`. Returns whether `target` still follows `user`.
pub fn unfollow(user: &mut User, target: &mut User) -> bool {
    let still_follows =
        target.friends.contains(&user.id) && !target.requests.contains(&user.id);
    if still_follows {
        user.requests.push(target.id.clone());
    }

    target.requests.retain(|id| id != &user.id);
    user.friends.retain(|id| id != &target.id);

    still_follows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::UserId;

    fn user(id: &str) -> User {
        let mut user = User::new(id.to_string());
        user.id = UserId::from(id);
        user
    }

    #[test]
    fn unanswered_follow_leaves_a_request() {
        let (mut a, mut b) = (user("a"), user("b"));
        follow(&mut a, &mut b);

        assert_eq!(a.friends, vec![b.id.clone()]);
        assert_eq!(b.requests, vec![a.id.clone()]);
        assert!(b.friends.is_empty());
    }

    #[test]
    fn follow_back_moves_request_into_friends() {
        let (mut a, mut b) = (user("a"), user("b"));
        follow(&mut a, &mut b);
        follow(&mut b, &mut a);

        assert!(b.requests.is_empty());
        assert_eq!(b.friends, vec![a.id.clone()]);
        assert_eq!(a.friends, vec![b.id.clone()]);
        assert!(a.requests.is_empty());
    }

    #[test]
    fn repeated_follow_does_not_duplicate_request() {
        let (mut a, mut b) = (user("a"), user("b"));
        follow(&mut a, &mut b);
        follow(&mut a, &mut b);

        assert_eq!(b.requests, vec![a.id.clone()]);
        // friends is appended without a check
        assert_eq!(a.friends.len(), 2);
    }

    #[test]
    fn unfollow_after_mutual_follow_turns_target_into_request() {
        let (mut a, mut b) = (user("a"), user("b"));
        follow(&mut a, &mut b);
        follow(&mut b, &mut a);

        let still_follows = unfollow(&mut a, &mut b);

        assert!(still_follows);
        assert!(a.friends.is_empty());
        assert_eq!(a.requests, vec![b.id.clone()]);
        assert_eq!(b.friends, vec![a.id.clone()]);
    }

    #[test]
    fn unfollow_unanswered_follow_clears_request() {
        let (mut a, mut b) = (user("a"), user("b"));
        follow(&mut a, &mut b);

        let still_follows = unfollow(&mut a, &mut b);

        assert!(!still_follows);
        assert!(a.friends.is_empty());
        assert!(b.requests.is_empty());
        assert!(a.requests.is_empty());
    }
}
