//! The per-service record shapes touched by the cascade.

/// A comment as the comment service stores it.
#[derive(Clone, Debug, PartialEq)]
pub struct CommentRecord {
    /// Identifier of the comment.
    pub comment_id: String,
    /// Author of the comment.
    pub user_id: String,
    /// Movie the comment belongs to.
    pub movie_id: String,
    /// Comment body.
    pub text: String,
}

/// A favorites entry as the favorites service stores it.
#[derive(Clone, Debug, PartialEq)]
pub struct FavoriteRecord {
    /// Identifier of the favorite.
    pub favorite_id: String,
    /// Owner of the favorites list.
    pub user_id: String,
    /// The favorited movie.
    pub movie_id: String,
}

/// A rating as the rating service stores it.
#[derive(Clone, Debug, PartialEq)]
pub struct RatingRecord {
    /// User who rated.
    pub user_id: String,
    /// Movie that was rated.
    pub movie_id: String,
    /// The score given.
    pub score: f64,
}

/// A movie as the movie service stores it, including the rating aggregate
/// folded in from `rating.*` events.
#[derive(Clone, Debug, PartialEq)]
pub struct MovieRecord {
    /// Identifier of the movie.
    pub movie_id: String,
    /// Display title.
    pub title: String,
    /// Average rating, denormalized from the rating service.
    pub average_rating: f64,
    /// Total number of ratings, denormalized from the rating service.
    pub ratings_count: u64,
}
