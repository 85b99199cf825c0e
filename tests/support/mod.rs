pub mod image;
pub mod mock_card;
