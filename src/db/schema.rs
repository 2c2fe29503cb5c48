diesel::table! {
    games (id) {
        id -> Integer,
        model1 -> Text,
        model2 -> Text,
        game_type -> Text,
        winner -> Text,
        moves -> Text,
        total_time_ms -> BigInt,
        created_at -> Timestamp,
    }
}
