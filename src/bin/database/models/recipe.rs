use chrono::{DateTime, Utc};
use diesel::prelude::*;

use super::user::User;

#[derive(Queryable, Selectable, Identifiable, Associations, Debug, Clone)]
#[diesel(belongs_to(User, foreign_key = author_id))]
#[diesel(table_name = crate::database::schema::recipes)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct Recipe {
    pub id: i32,
    // ownership is never transferred
    pub author_id: i32,
    pub name: String,
    pub text: String,
    pub image: String,
    pub cooking_time: i16,
    pub pub_date: DateTime<Utc>,
}

impl PartialEq for Recipe {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

#[derive(Insertable, Debug)]
#[diesel(table_name = crate::database::schema::recipes)]
pub struct NewRecipe<'a> {
    pub author_id: i32,
    pub name: &'a str,
    pub text: &'a str,
    pub image: &'a str,
    pub cooking_time: i16,
}

#[derive(AsChangeset, Debug)]
#[diesel(table_name = crate::database::schema::recipes)]
pub struct RecipeChangeset<'a> {
    pub name: &'a str,
    pub text: &'a str,
    pub image: Option<&'a str>,
    pub cooking_time: i16,
}
