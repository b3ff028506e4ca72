use diesel::{
    dsl::exists,
    pg::Pg,
    prelude::*,
    r2d2::{ConnectionManager, PooledConnection},
};
use itertools::Itertools;
use lombok::AllArgsConstructor;
use tracing::{debug, trace_span};

use crate::{
    database::{
        connection::PgPool,
        models::{
            favorite::Favorite,
            follow::Follow,
            ingredient::{Ingredient, NewIngredient},
            ingredient_recipe::IngredientRecipe,
            recipe::{NewRecipe, Recipe, RecipeChangeset},
            recipe_tag::RecipeTag,
            shopping_cart::ShoppingCartEntry,
            tag::Tag,
            user::User,
        },
        schema::{
            auth_tokens, favorites, follows, ingredient_recipes, ingredients, recipe_tags, recipes,
            shopping_carts, tags, users,
        },
    },
    shopping_list::CartLine,
};

use super::recipe_store::{Page, RecipeDraft, RecipeFilter, RecipeIngredient, RecipeStore, StoreError};

// Postgres caps bind parameters per statement
const INSERT_CHUNK: usize = 1000;

/// [`RecipeStore`] over PostgreSQL through an r2d2 pool of diesel connections.
#[derive(AllArgsConstructor, Clone)]
pub struct DatabaseStore {
    pool: PgPool,
}

impl DatabaseStore {
    fn connection(&self) -> Result<PooledConnection<ConnectionManager<PgConnection>>, StoreError> {
        Ok(self.pool.get()?)
    }

    fn filtered(filter: &RecipeFilter) -> recipes::BoxedQuery<'static, Pg> {
        let mut query = recipes::table.into_boxed();

        if let Some(author_id) = filter.author {
            query = query.filter(recipes::author_id.eq(author_id));
        }

        if !filter.tags.is_empty() {
            query = query.filter(
                recipes::id.eq_any(
                    recipe_tags::table
                        .inner_join(tags::table)
                        .filter(tags::slug.eq_any(filter.tags.clone()))
                        .select(recipe_tags::recipe_id),
                ),
            );
        }

        if let Some(user_id) = filter.favorited_by {
            query = query.filter(
                recipes::id.eq_any(
                    favorites::table
                        .filter(favorites::user_id.eq(user_id))
                        .select(favorites::recipe_id),
                ),
            );
        }

        if let Some(user_id) = filter.in_cart_of {
            query = query.filter(
                recipes::id.eq_any(
                    shopping_carts::table
                        .filter(shopping_carts::user_id.eq(user_id))
                        .select(shopping_carts::recipe_id),
                ),
            );
        }

        query
    }

    fn insert_links(connection: &mut PgConnection, recipe_id: i32, draft: &RecipeDraft) -> QueryResult<()> {
        let links = draft
            .tags
            .iter()
            .map(|tag_id| RecipeTag::new(recipe_id, *tag_id))
            .collect_vec();
        diesel::insert_into(recipe_tags::table)
            .values(&links)
            .execute(connection)?;

        let lines = draft
            .ingredients
            .iter()
            .map(|(ingredient_id, amount)| IngredientRecipe::new(recipe_id, *ingredient_id, *amount))
            .collect_vec();
        diesel::insert_into(ingredient_recipes::table)
            .values(&lines)
            .execute(connection)?;

        Ok(())
    }
}

impl RecipeStore for DatabaseStore {
    fn user_by_token(&self, key: &str) -> Result<Option<User>, StoreError> {
        let mut connection = self.connection()?;

        Ok(auth_tokens::table
            .inner_join(users::table)
            .filter(auth_tokens::key.eq(key))
            .select(User::as_select())
            .first(&mut connection)
            .optional()?)
    }

    fn user(&self, id: i32) -> Result<Option<User>, StoreError> {
        let mut connection = self.connection()?;

        Ok(users::table
            .find(id)
            .select(User::as_select())
            .first(&mut connection)
            .optional()?)
    }

    fn tags(&self) -> Result<Vec<Tag>, StoreError> {
        let mut connection = self.connection()?;

        Ok(tags::table
            .order(tags::name.desc())
            .select(Tag::as_select())
            .load(&mut connection)?)
    }

    fn tag(&self, id: i32) -> Result<Option<Tag>, StoreError> {
        let mut connection = self.connection()?;

        Ok(tags::table
            .find(id)
            .select(Tag::as_select())
            .first(&mut connection)
            .optional()?)
    }

    fn ingredients(&self, name_prefix: Option<&str>) -> Result<Vec<Ingredient>, StoreError> {
        let mut connection = self.connection()?;

        let mut query = ingredients::table.into_boxed();
        if let Some(prefix) = name_prefix {
            query = query.filter(ingredients::name.ilike(format!("{}%", escape_like(prefix))));
        }

        Ok(query
            .order(ingredients::name.desc())
            .select(Ingredient::as_select())
            .load(&mut connection)?)
    }

    fn ingredient(&self, id: i32) -> Result<Option<Ingredient>, StoreError> {
        let mut connection = self.connection()?;

        Ok(ingredients::table
            .find(id)
            .select(Ingredient::as_select())
            .first(&mut connection)
            .optional()?)
    }

    fn replace_ingredients(&self, new_ingredients: &[NewIngredient]) -> Result<usize, StoreError> {
        let span = trace_span!("replacing ingredients", count = new_ingredients.len());
        let _guard = span.enter();

        let mut connection = self.connection()?;

        connection.transaction::<_, StoreError, _>(|connection| {
            let removed = diesel::delete(ingredients::table).execute(connection)?;
            debug!(removed, "Cleared ingredients");

            let mut inserted = 0;
            for chunk in new_ingredients.chunks(INSERT_CHUNK) {
                inserted += diesel::insert_into(ingredients::table)
                    .values(chunk)
                    .execute(connection)?;
            }

            Ok(inserted)
        })
    }

    fn recipes(&self, filter: &RecipeFilter, page: Page) -> Result<(Vec<Recipe>, i64), StoreError> {
        let mut connection = self.connection()?;

        let count = Self::filtered(filter).count().get_result(&mut connection)?;
        let recipes = Self::filtered(filter)
            .select(Recipe::as_select())
            .order((recipes::pub_date.desc(), recipes::id.desc()))
            .limit(page.limit())
            .offset(page.offset())
            .load(&mut connection)?;

        Ok((recipes, count))
    }

    fn recipe(&self, id: i32) -> Result<Option<Recipe>, StoreError> {
        let mut connection = self.connection()?;

        Ok(recipes::table
            .find(id)
            .select(Recipe::as_select())
            .first(&mut connection)
            .optional()?)
    }

    fn recipe_tags(&self, recipe_id: i32) -> Result<Vec<Tag>, StoreError> {
        let mut connection = self.connection()?;

        Ok(recipe_tags::table
            .inner_join(tags::table)
            .filter(recipe_tags::recipe_id.eq(recipe_id))
            .order(tags::id.asc())
            .select(Tag::as_select())
            .load(&mut connection)?)
    }

    fn recipe_ingredients(&self, recipe_id: i32) -> Result<Vec<RecipeIngredient>, StoreError> {
        let mut connection = self.connection()?;

        let rows: Vec<(Ingredient, f64)> = ingredient_recipes::table
            .inner_join(ingredients::table)
            .filter(ingredient_recipes::recipe_id.eq(recipe_id))
            .order(ingredient_recipes::id.asc())
            .select((Ingredient::as_select(), ingredient_recipes::amount))
            .load(&mut connection)?;

        Ok(rows
            .into_iter()
            .map(|(ingredient, amount)| RecipeIngredient { ingredient, amount })
            .collect())
    }

    fn recipes_by_author(&self, author_id: i32, limit: Option<i64>) -> Result<(Vec<Recipe>, i64), StoreError> {
        let mut connection = self.connection()?;

        let count = recipes::table
            .filter(recipes::author_id.eq(author_id))
            .count()
            .get_result(&mut connection)?;

        let mut query = recipes::table
            .filter(recipes::author_id.eq(author_id))
            .select(Recipe::as_select())
            .order((recipes::pub_date.desc(), recipes::id.desc()))
            .into_boxed();
        if let Some(limit) = limit {
            query = query.limit(limit.max(0));
        }

        Ok((query.load(&mut connection)?, count))
    }

    fn create_recipe(&self, author_id: i32, draft: &RecipeDraft) -> Result<Recipe, StoreError> {
        let mut connection = self.connection()?;

        connection.transaction::<_, StoreError, _>(|connection| {
            let recipe = diesel::insert_into(recipes::table)
                .values(&NewRecipe {
                    author_id,
                    name: &draft.name,
                    text: &draft.text,
                    image: draft.image.as_deref().unwrap_or_default(),
                    cooking_time: draft.cooking_time,
                })
                .returning(Recipe::as_returning())
                .get_result(connection)?;

            Self::insert_links(connection, recipe.id, draft)?;

            Ok(recipe)
        })
    }

    fn update_recipe(&self, id: i32, draft: &RecipeDraft) -> Result<Recipe, StoreError> {
        let mut connection = self.connection()?;

        connection.transaction::<_, StoreError, _>(|connection| {
            let recipe = diesel::update(recipes::table.find(id))
                .set(&RecipeChangeset {
                    name: &draft.name,
                    text: &draft.text,
                    image: draft.image.as_deref(),
                    cooking_time: draft.cooking_time,
                })
                .returning(Recipe::as_returning())
                .get_result(connection)?;

            diesel::delete(recipe_tags::table.filter(recipe_tags::recipe_id.eq(id))).execute(connection)?;
            diesel::delete(ingredient_recipes::table.filter(ingredient_recipes::recipe_id.eq(id)))
                .execute(connection)?;
            Self::insert_links(connection, id, draft)?;

            Ok(recipe)
        })
    }

    fn delete_recipe(&self, id: i32) -> Result<(), StoreError> {
        let mut connection = self.connection()?;

        // links, favorites and cart entries cascade
        match diesel::delete(recipes::table.find(id)).execute(&mut connection)? {
            0 => Err(StoreError::NotFound),
            _ => Ok(()),
        }
    }

    fn add_favorite(&self, user_id: i32, recipe_id: i32) -> Result<(), StoreError> {
        let mut connection = self.connection()?;

        diesel::insert_into(favorites::table)
            .values(Favorite::new(user_id, recipe_id))
            .execute(&mut connection)?;

        Ok(())
    }

    fn remove_favorite(&self, user_id: i32, recipe_id: i32) -> Result<bool, StoreError> {
        let mut connection = self.connection()?;

        let removed = diesel::delete(
            favorites::table
                .filter(favorites::user_id.eq(user_id))
                .filter(favorites::recipe_id.eq(recipe_id)),
        )
        .execute(&mut connection)?;

        Ok(removed > 0)
    }

    fn is_favorited(&self, user_id: i32, recipe_id: i32) -> Result<bool, StoreError> {
        let mut connection = self.connection()?;

        Ok(diesel::select(exists(
            favorites::table
                .filter(favorites::user_id.eq(user_id))
                .filter(favorites::recipe_id.eq(recipe_id)),
        ))
        .get_result(&mut connection)?)
    }

    fn add_to_cart(&self, user_id: i32, recipe_id: i32) -> Result<(), StoreError> {
        let mut connection = self.connection()?;

        diesel::insert_into(shopping_carts::table)
            .values(ShoppingCartEntry::new(user_id, recipe_id))
            .execute(&mut connection)?;

        Ok(())
    }

    fn remove_from_cart(&self, user_id: i32, recipe_id: i32) -> Result<bool, StoreError> {
        let mut connection = self.connection()?;

        let removed = diesel::delete(
            shopping_carts::table
                .filter(shopping_carts::user_id.eq(user_id))
                .filter(shopping_carts::recipe_id.eq(recipe_id)),
        )
        .execute(&mut connection)?;

        Ok(removed > 0)
    }

    fn is_in_cart(&self, user_id: i32, recipe_id: i32) -> Result<bool, StoreError> {
        let mut connection = self.connection()?;

        Ok(diesel::select(exists(
            shopping_carts::table
                .filter(shopping_carts::user_id.eq(user_id))
                .filter(shopping_carts::recipe_id.eq(recipe_id)),
        ))
        .get_result(&mut connection)?)
    }

    fn cart_lines(&self, user_id: i32) -> Result<Vec<CartLine>, StoreError> {
        let mut connection = self.connection()?;

        let rows: Vec<(String, String, f64)> = ingredient_recipes::table
            .inner_join(ingredients::table)
            .inner_join(shopping_carts::table.on(shopping_carts::recipe_id.eq(ingredient_recipes::recipe_id)))
            .filter(shopping_carts::user_id.eq(user_id))
            .select((
                ingredients::name,
                ingredients::measurement_unit,
                ingredient_recipes::amount,
            ))
            .load(&mut connection)?;

        Ok(rows
            .into_iter()
            .map(|(name, measurement_unit, amount)| CartLine::new(name, measurement_unit, amount))
            .collect())
    }

    fn follow(&self, user_id: i32, author_id: i32) -> Result<(), StoreError> {
        if user_id == author_id {
            return Err(StoreError::SelfFollow);
        }
        let mut connection = self.connection()?;

        diesel::insert_into(follows::table)
            .values(Follow::new(user_id, author_id))
            .execute(&mut connection)?;

        Ok(())
    }

    fn unfollow(&self, user_id: i32, author_id: i32) -> Result<bool, StoreError> {
        let mut connection = self.connection()?;

        let removed = diesel::delete(
            follows::table
                .filter(follows::user_id.eq(user_id))
                .filter(follows::author_id.eq(author_id)),
        )
        .execute(&mut connection)?;

        Ok(removed > 0)
    }

    fn is_following(&self, user_id: i32, author_id: i32) -> Result<bool, StoreError> {
        let mut connection = self.connection()?;

        Ok(diesel::select(exists(
            follows::table
                .filter(follows::user_id.eq(user_id))
                .filter(follows::author_id.eq(author_id)),
        ))
        .get_result(&mut connection)?)
    }

    fn followed_authors(&self, user_id: i32, page: Page) -> Result<(Vec<User>, i64), StoreError> {
        let mut connection = self.connection()?;

        let count = follows::table
            .filter(follows::user_id.eq(user_id))
            .count()
            .get_result(&mut connection)?;

        let authors = follows::table
            .inner_join(users::table.on(users::id.eq(follows::author_id)))
            .filter(follows::user_id.eq(user_id))
            .order(users::id.asc())
            .limit(page.limit())
            .offset(page.offset())
            .select(User::as_select())
            .load(&mut connection)?;

        Ok((authors, count))
    }
}

fn escape_like(text: &str) -> String {
    text.chars()
        .fold(String::with_capacity(text.len()), |mut escaped, c| {
            if matches!(c, '\\' | '%' | '_') {
                escaped.push('\\');
            }
            escaped.push(c);
            escaped
        })
}
