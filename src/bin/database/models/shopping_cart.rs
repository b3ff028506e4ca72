use diesel::prelude::*;
use lombok::AllArgsConstructor;

// date_added is filled in by the database
#[derive(Insertable, AllArgsConstructor, Debug, Clone, PartialEq, Eq, Hash)]
#[diesel(table_name = crate::database::schema::shopping_carts)]
pub struct ShoppingCartEntry {
    pub user_id: i32,
    pub recipe_id: i32,
}
