use diesel::prelude::*;
use lombok::AllArgsConstructor;

#[derive(Queryable, Selectable, Insertable, AllArgsConstructor, Debug, Clone, PartialEq, Eq, Hash)]
#[diesel(table_name = crate::database::schema::favorites)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Favorite {
    pub user_id: i32,
    pub recipe_id: i32,
}
