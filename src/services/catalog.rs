//! Catalog reads and admin book management

use crate::{
    error::AppResult,
    models::{
        book::{Book, BookDetail, BookShort, SaveBook},
        loan::MyLoans,
        session::FlashMessages,
        Dashboard,
    },
    repository::Repository,
};

use super::storage::{AssetKind, FileStorage};

/// An uploaded file as received from the client
#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

#[derive(Clone)]
pub struct CatalogService {
    repository: Repository,
    storage: FileStorage,
}

impl CatalogService {
    pub fn new(repository: Repository, storage: FileStorage) -> Self {
        Self { repository, storage }
    }

    /// Released books, by title
    pub async fn released_books(&self) -> AppResult<Vec<BookShort>> {
        self.repository.books.list_released().await
    }

    /// Upcoming books, soonest first
    pub async fn upcoming_books(&self) -> AppResult<Vec<BookShort>> {
        self.repository.books.list_upcoming().await
    }

    /// Book detail with the caller's loan flag; `flash` is left empty
    pub async fn book_detail(&self, user_id: i32, book_id: i32) -> AppResult<BookDetail> {
        let book = self.repository.books.get_by_id(book_id).await?;
        let user_has_loan = self.repository.loans.has_active_loan(user_id, book_id).await?;
        Ok(BookDetail {
            book,
            user_has_loan,
            flash: FlashMessages::default(),
        })
    }

    pub async fn user_loans(&self, user_id: i32) -> AppResult<MyLoans> {
        let loans = self.repository.loans.get_user_loans(user_id).await?;
        Ok(MyLoans {
            loans,
            flash: FlashMessages::default(),
        })
    }

    pub async fn dashboard(&self) -> AppResult<Dashboard> {
        Ok(Dashboard {
            user_count: self.repository.users.count().await?,
            book_count: self.repository.books.count().await?,
            loan_count: self.repository.loans.count().await?,
            books: self.repository.books.list_all().await?,
            users: self.repository.users.list().await?,
        })
    }

    /// Create a book, storing any uploaded files first
    pub async fn create_book(
        &self,
        mut book: SaveBook,
        cover: Option<Upload>,
        pdf: Option<Upload>,
    ) -> AppResult<Book> {
        self.store_uploads(&mut book, cover, pdf).await?;

        match self.repository.books.create(&book).await {
            Ok(created) => {
                tracing::info!(book_id = created.id, title = %created.title, "Book created");
                Ok(created)
            }
            Err(e) => {
                self.discard(&book).await;
                Err(e)
            }
        }
    }

    /// Update a book. Stock is left untouched; stored files are replaced
    /// only when a new one is uploaded.
    pub async fn update_book(
        &self,
        id: i32,
        mut book: SaveBook,
        cover: Option<Upload>,
        pdf: Option<Upload>,
    ) -> AppResult<Book> {
        let previous = self.repository.books.get_by_id(id).await?;
        self.store_uploads(&mut book, cover, pdf).await?;

        let updated = match self.repository.books.update(id, &book).await {
            Ok(updated) => updated,
            Err(e) => {
                self.discard(&book).await;
                return Err(e);
            }
        };

        if book.cover_image_path.is_some() {
            if let Some(old) = previous.cover_image_path {
                self.storage.remove(AssetKind::Cover, &old).await;
            }
        }
        if book.pdf_file_path.is_some() {
            if let Some(old) = previous.pdf_file_path {
                self.storage.remove(AssetKind::Pdf, &old).await;
            }
        }

        tracing::info!(book_id = id, "Book updated");
        Ok(updated)
    }

    /// Delete a book and its stored files
    pub async fn delete_book(&self, id: i32) -> AppResult<()> {
        let (cover, pdf) = self.repository.books.delete(id).await?;
        if let Some(cover) = cover {
            self.storage.remove(AssetKind::Cover, &cover).await;
        }
        if let Some(pdf) = pdf {
            self.storage.remove(AssetKind::Pdf, &pdf).await;
        }
        tracing::info!(book_id = id, "Book deleted");
        Ok(())
    }

    async fn store_uploads(
        &self,
        book: &mut SaveBook,
        cover: Option<Upload>,
        pdf: Option<Upload>,
    ) -> AppResult<()> {
        if let Some(cover) = cover {
            let name = self
                .storage
                .save(AssetKind::Cover, &cover.file_name, &cover.bytes)
                .await?;
            book.cover_image_path = Some(name);
        }
        if let Some(pdf) = pdf {
            match self.storage.save(AssetKind::Pdf, &pdf.file_name, &pdf.bytes).await {
                Ok(name) => book.pdf_file_path = Some(name),
                Err(e) => {
                    self.discard(book).await;
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    /// Remove files stored for a save that did not reach the database
    async fn discard(&self, book: &SaveBook) {
        if let Some(cover) = &book.cover_image_path {
            self.storage.remove(AssetKind::Cover, cover).await;
        }
        if let Some(pdf) = &book.pdf_file_path {
            self.storage.remove(AssetKind::Pdf, pdf).await;
        }
    }
}
