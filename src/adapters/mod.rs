// 對外系統的具體實作：物件儲存與資料倉儲
pub mod storage;
pub mod warehouse;
